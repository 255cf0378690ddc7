//! Core entities for hotels, reviews and per-hotel filter aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The tuple needed to address the review API for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelIdentity {
    /// Site-assigned numeric hotel id.
    pub hotel_id: i64,
    /// The site's internal facility identifier, distinct from the hotel id.
    pub ufi: i64,
    /// Two-letter country code, taken from the hotel page URL.
    pub country_code: String,
}

impl HotelIdentity {
    /// Required fields must be present before any network call is attempted.
    pub fn validate(&self) -> Result<(), String> {
        let mut missing = Vec::new();
        if self.hotel_id <= 0 {
            missing.push("hotel_id");
        }
        if self.ufi <= 0 {
            missing.push("ufi");
        }
        if self.country_code.trim().is_empty() {
            missing.push("country_code");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing required hotel fields: {}", missing.join(", ")))
        }
    }
}

/// Hotel identity plus the display fields scraped from the hotel page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelInfo {
    pub identity: HotelIdentity,
    pub name: String,
    pub score: f64,
    pub city_name: String,
    pub country_name: String,
    /// Canonical page URL, also used as referer on API calls.
    pub page_url: String,
}

/// A persisted hotel row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotel {
    /// Local database row id.
    pub id: i64,
    pub hotel_id: i64,
    pub name: String,
    pub country_code: String,
    pub country_name: String,
    pub city_name: String,
    pub ufi: i64,
    pub total_reviews: i64,
    pub average_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single normalized review as produced by the response parser.
///
/// The raw source payload is retained verbatim for forward compatibility;
/// reviews are never updated once inserted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Globally unique natural key.
    pub review_url: String,
    pub username: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub reviewed_date: Option<String>,
    pub review_score: Option<f64>,
    pub positive_text: Option<String>,
    pub negative_text: Option<String>,
    pub checkin_date: Option<String>,
    pub checkout_date: Option<String>,
    pub lang: Option<String>,
    pub photo_urls: Vec<String>,
    pub raw: serde_json::Value,
}

/// One breakdown bucket of a customer-type or score filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterBucket {
    pub name: String,
    pub value: String,
    pub count: i64,
}

/// One language breakdown bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageBucket {
    pub name: String,
    pub value: String,
    pub count: i64,
    pub country_flag: Option<String>,
}

/// One per-category rating score (cleanliness, location, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingScoreEntry {
    pub name: String,
    pub translation: String,
    pub value: Option<f64>,
}

/// One topic filter entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub id: Option<i64>,
    pub name: String,
    pub translation_id: Option<String>,
    pub translation_name: Option<String>,
    pub is_selected: bool,
}

/// Aggregate statistics for a hotel as reported alongside one page.
///
/// These represent the current totals across all reviews, not just the
/// fetched page; each hotel refresh replaces the previous snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotelStats {
    pub reviews_count: i64,
    pub rating_scores: Vec<RatingScoreEntry>,
    pub customer_type_filter: Vec<FilterBucket>,
    pub language_filter: Vec<LanguageBucket>,
    pub topic_filters: Vec<TopicEntry>,
}

impl HotelStats {
    /// Total review count for the hotel, taken from the first customer-type
    /// bucket (the "all customers" bucket the source always emits first).
    pub fn total_reviews(&self) -> i64 {
        self.customer_type_filter.first().map_or(0, |b| b.count)
    }
}
