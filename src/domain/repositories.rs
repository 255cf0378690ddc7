//! Async traits at the seams of the pagination loop.
//!
//! The loop only ever talks to a page fetcher and a review store; both are
//! trait objects so the loop's state machine can be tested with scripted
//! implementations.

use async_trait::async_trait;

use crate::domain::entities::{Hotel, HotelInfo, HotelStats, ReviewRecord};
use crate::domain::errors::ScrapeResult;
use crate::domain::filters::{CustomerType, ScoreRange, SortOrder, TimeOfYear};

/// Filter, sort and pagination parameters for one page request.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub sort: SortOrder,
    /// Number of reviews to bypass (0-based offset).
    pub skip: i64,
    /// Page size.
    pub limit: i64,
    pub time_of_year: TimeOfYear,
    pub customer_type: CustomerType,
    pub score_range: ScoreRange,
    /// Lower-cased ISO language codes; empty means all languages.
    pub languages: Vec<String>,
}

/// Issues requests against the external review source.
#[async_trait]
pub trait ReviewPageFetcher: Send + Sync {
    /// Fetch the hotel's canonical page and extract its identity fields.
    async fn fetch_hotel_info(&self, url: &str) -> ScrapeResult<HotelInfo>;

    /// Fetch one page of reviews. Returns the raw page payload; transport
    /// failures are retried internally, API-level errors are terminal.
    async fn fetch_review_page(
        &self,
        info: &HotelInfo,
        query: &PageQuery,
    ) -> ScrapeResult<serde_json::Value>;
}

/// Persistent dedup store; sole writer of hotels, reviews and aggregates.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Upsert the hotel by its site-assigned id and atomically replace all
    /// four filter-aggregate sets with the snapshot's rows.
    async fn save_hotel_snapshot(&self, stats: &HotelStats, info: &HotelInfo)
        -> ScrapeResult<Hotel>;

    /// Insert reviews that are not already present (by review URL).
    /// Returns `(added, skipped)` counts.
    async fn save_reviews(
        &self,
        reviews: &[ReviewRecord],
        hotel: &Hotel,
    ) -> ScrapeResult<(u64, u64)>;
}
