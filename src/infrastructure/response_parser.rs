//! Response Normalizer
//!
//! Pure transformations from a raw page payload to validated review records
//! and aggregate statistics. Never fails on malformed input: bad review
//! entries are dropped with a recorded reason, malformed aggregate fields
//! default to empty or zero, so the caller can always proceed to the next
//! page.

use serde_json::Value;
use tracing::warn;

use crate::domain::entities::{
    FilterBucket, HotelStats, LanguageBucket, RatingScoreEntry, ReviewRecord, TopicEntry,
};

/// The only photo size variant persisted; entries without it are skipped.
const REQUIRED_PHOTO_SIZE: &str = "max1280x900";

/// One dropped review entry and why it was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

/// Valid records plus the rejection reasons for dropped entries.
#[derive(Debug, Default)]
pub struct ParsedReviews {
    pub records: Vec<ReviewRecord>,
    pub rejections: Vec<Rejection>,
}

/// Extract and validate the review list from a raw page payload.
pub fn parse_reviews(page: &Value) -> ParsedReviews {
    let mut parsed = ParsedReviews::default();

    let Some(frontend) = page.pointer("/data/reviewListFrontend").filter(|v| v.is_object()) else {
        warn!("Missing or invalid reviewListFrontend field in page payload");
        return parsed;
    };
    if frontend.get("statusCode").is_some() {
        let message = frontend
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        warn!("Page payload carries an error object: {message}");
        return parsed;
    }

    let Some(cards) = frontend.get("reviewCard").and_then(Value::as_array) else {
        warn!("Empty or invalid reviewCard field");
        return parsed;
    };

    for (index, card) in cards.iter().enumerate() {
        match validate_review_card(card) {
            Ok(()) => parsed.records.push(to_record(card)),
            Err(reason) => {
                parsed.rejections.push(Rejection { index, reason });
            }
        }
    }
    parsed
}

/// Check presence and type of the required sub-objects and scalar fields.
fn validate_review_card(card: &Value) -> Result<(), String> {
    if !card.is_object() {
        return Err("entry is not an object".to_string());
    }

    let mut invalid = Vec::new();
    for field in ["bookingDetails", "guestDetails", "textDetails"] {
        if !card.get(field).is_some_and(Value::is_object) {
            invalid.push(field);
        }
    }
    if !card.get("reviewScore").is_some_and(Value::is_number) {
        invalid.push("reviewScore");
    }
    // Dates arrive as either strings or epoch numbers depending on locale.
    if !card
        .get("reviewedDate")
        .is_some_and(|v| v.is_string() || v.is_number())
    {
        invalid.push("reviewedDate");
    }
    if !card
        .get("reviewUrl")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
    {
        invalid.push("reviewUrl");
    }

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(format!("invalid or missing fields: {}", invalid.join(", ")))
    }
}

/// Build a normalized record from a validated card. The raw payload is
/// carried along verbatim.
fn to_record(card: &Value) -> ReviewRecord {
    let guest = &card["guestDetails"];
    let text = &card["textDetails"];
    let booking = &card["bookingDetails"];

    let reviewed_date = match card.get("reviewedDate") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    ReviewRecord {
        review_url: card["reviewUrl"].as_str().unwrap_or_default().to_string(),
        username: owned_str(guest.get("username")),
        country_code: owned_str(guest.get("countryCode")),
        country_name: owned_str(guest.get("countryName")),
        reviewed_date,
        review_score: card.get("reviewScore").and_then(Value::as_f64),
        positive_text: owned_str(text.get("positiveText")),
        negative_text: owned_str(text.get("negativeText")),
        checkin_date: owned_str(booking.get("checkinDate")),
        checkout_date: owned_str(booking.get("checkoutDate")),
        lang: owned_str(text.get("lang")),
        photo_urls: extract_photo_urls(card.get("photos").unwrap_or(&Value::Null)),
        raw: card.clone(),
    }
}

fn owned_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

/// Extract aggregate counts and filter breakdowns from a page payload.
/// Missing or malformed fields default to empty/zero.
pub fn extract_stats(page: &Value) -> HotelStats {
    let Some(frontend) = page.pointer("/data/reviewListFrontend").filter(|v| v.is_object()) else {
        warn!("Invalid reviewListFrontend field; using default stats");
        return HotelStats::default();
    };

    let reviews_count = frontend
        .get("reviewsCount")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let buckets = |field: &str| -> Vec<FilterBucket> {
        array_of(frontend, field)
            .iter()
            .filter(|v| v.is_object())
            .map(|v| FilterBucket {
                name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                value: v.get("value").and_then(Value::as_str).unwrap_or_default().to_string(),
                count: v.get("count").and_then(Value::as_i64).unwrap_or(0),
            })
            .collect()
    };

    let language_filter = array_of(frontend, "languageFilter")
        .iter()
        .filter(|v| v.is_object())
        .map(|v| LanguageBucket {
            name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            value: v.get("value").and_then(Value::as_str).unwrap_or_default().to_string(),
            count: v.get("count").and_then(Value::as_i64).unwrap_or(0),
            country_flag: owned_str(v.get("countryFlag")),
        })
        .collect();

    let rating_scores = array_of(frontend, "ratingScores")
        .iter()
        .filter(|v| v.is_object())
        .map(|v| RatingScoreEntry {
            name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            translation: v
                .get("translation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            value: v.get("value").and_then(Value::as_f64),
        })
        .collect();

    let topic_filters = array_of(frontend, "topicFilters")
        .iter()
        .filter(|v| v.is_object())
        .map(|v| {
            let translation = v.get("translation").filter(|t| t.is_object());
            TopicEntry {
                id: v.get("id").and_then(Value::as_i64),
                name: v.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                translation_id: translation.and_then(|t| owned_str(t.get("id"))),
                translation_name: translation.and_then(|t| owned_str(t.get("name"))),
                is_selected: v.get("isSelected").and_then(Value::as_bool).unwrap_or(false),
            }
        })
        .collect();

    HotelStats {
        reviews_count,
        rating_scores,
        customer_type_filter: buckets("customerTypeFilter"),
        language_filter,
        topic_filters,
    }
}

fn array_of<'a>(node: &'a Value, field: &str) -> &'a [Value] {
    node.get(field).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

/// Select one URL per photo entry: the one tagged with the required large
/// size variant. Entries without that variant are skipped, no fallback.
pub fn extract_photo_urls(photos: &Value) -> Vec<String> {
    let Some(photos) = photos.as_array() else {
        return Vec::new();
    };

    photos
        .iter()
        .filter_map(|photo| {
            photo
                .get("urls")?
                .as_array()?
                .iter()
                .find(|entry| {
                    entry.get("size").and_then(Value::as_str) == Some(REQUIRED_PHOTO_SIZE)
                })
                .and_then(|entry| entry.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}
