//! review-harvest - Hotel review crawling library
//!
//! Fetches hotel reviews from a travel site's paginated review API,
//! normalizes them and persists them to SQLite with duplicate detection.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::errors::{ScrapeError, ScrapeResult};
