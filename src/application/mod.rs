//! Application layer: crawl orchestration over the domain seams.

pub mod crawler;

pub use crawler::{CrawlerConfig, HotelCrawler, HotelCrawlResult, StopReason};
