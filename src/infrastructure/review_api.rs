//! Page Fetcher for the review API
//!
//! Builds the structured GraphQL request body for one page, sends it with a
//! bounded timeout and retries transport failures with exponential backoff
//! plus jitter. Application-level error payloads from the source are
//! terminal for the page and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::entities::{HotelIdentity, HotelInfo};
use crate::domain::errors::{ScrapeError, ScrapeResult};
use crate::domain::repositories::{PageQuery, ReviewPageFetcher};
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::hotel_page;
use crate::infrastructure::http_client::HttpClient;

/// The ReviewList query document sent with every page request.
const REVIEW_LIST_QUERY: &str = r#"
query ReviewList($input: ReviewListFrontendInput!, $shouldShowReviewListPhotoAltText: Boolean = false) {
  reviewListFrontend(input: $input) {
    ... on ReviewListFrontendResult {
      ratingScores {
        name
        translation
        value
        __typename
      }
      topicFilters {
        id
        name
        isSelected
        translation {
          id
          name
          __typename
        }
        __typename
      }
      reviewScoreFilter {
        name
        value
        count
        __typename
      }
      languageFilter {
        name
        value
        count
        countryFlag
        __typename
      }
      timeOfYearFilter {
        name
        value
        count
        __typename
      }
      customerTypeFilter {
        count
        name
        value
        __typename
      }
      reviewCard {
        reviewUrl
        guestDetails {
          username
          avatarUrl
          countryCode
          countryName
          anonymous
          guestTypeTranslation
          __typename
        }
        bookingDetails {
          customerType
          roomId
          roomType {
            id
            name
            __typename
          }
          checkoutDate
          checkinDate
          numNights
          stayStatus
          __typename
        }
        reviewedDate
        isTranslatable
        helpfulVotesCount
        reviewScore
        textDetails {
          title
          positiveText
          negativeText
          textTrivialFlag
          lang
          __typename
        }
        isApproved
        partnerReply {
          reply
          __typename
        }
        editUrl
        photos {
          id
          urls {
            size
            url
            __typename
          }
          kind
          mlTagHighestProbability @include(if: $shouldShowReviewListPhotoAltText)
          __typename
        }
        __typename
      }
      reviewsCount
      sorters {
        name
        value
        __typename
      }
      __typename
    }
    ... on ReviewsFrontendError {
      statusCode
      message
      __typename
    }
    __typename
  }
}
"#;

/// Structured request body for one page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListRequest {
    pub operation_name: &'static str,
    pub variables: RequestVariables,
    pub query: &'static str,
    pub extensions: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestVariables {
    pub input: ReviewListInput,
    pub should_show_review_list_photo_alt_text: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListInput {
    pub hotel_id: i64,
    pub ufi: i64,
    pub hotel_country_code: String,
    pub sorter: &'static str,
    pub filters: ReviewFilters,
    pub skip: i64,
    pub limit: i64,
    pub upsort_review_url: String,
}

/// Filter block. Fields left at their `ALL` sentinel are omitted entirely.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFilters {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_year: Option<&'static str>,
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_range: Option<&'static str>,
}

impl ReviewListRequest {
    pub fn new(identity: &HotelIdentity, query: &PageQuery) -> Self {
        Self {
            operation_name: "ReviewList",
            variables: RequestVariables {
                input: ReviewListInput {
                    hotel_id: identity.hotel_id,
                    ufi: identity.ufi,
                    hotel_country_code: identity.country_code.clone(),
                    sorter: query.sort.api_value(),
                    filters: ReviewFilters {
                        text: String::new(),
                        customer_type: query.customer_type.api_value(),
                        time_of_year: query.time_of_year.api_value(),
                        languages: query.languages.clone(),
                        score_range: query.score_range.api_value(),
                    },
                    skip: query.skip,
                    limit: query.limit,
                    upsort_review_url: String::new(),
                },
                should_show_review_list_photo_alt_text: true,
            },
            query: REVIEW_LIST_QUERY,
            extensions: serde_json::json!({}),
        }
    }
}

/// Retry policy for transport-level failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 10% random jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * f64::from(1u32 << (attempt.saturating_sub(1)).min(16));
        let jitter = fastrand::f64() * 0.1 * base;
        Duration::from_secs_f64(base + jitter)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping the backoff delay
/// between transient failures. Terminal errors short-circuit immediately.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> ScrapeResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = ScrapeResult<T>>,
{
    let mut last: Option<ScrapeError> = None;
    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                warn!(
                    "Transport error on attempt {}/{}: {}",
                    attempt, policy.max_attempts, err
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff_delay(attempt)).await;
                }
                last = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    let (status, body) = match last {
        Some(ScrapeError::Request { status, body, .. }) => (status, body),
        _ => (None, None),
    };
    Err(ScrapeError::Request {
        message: format!("request failed after {} attempts", policy.max_attempts),
        status,
        body,
        transient: true,
    })
}

/// Fetcher against the live review API.
pub struct ReviewApiClient {
    http: Arc<HttpClient>,
    api: ApiConfig,
    retry: RetryPolicy,
}

impl ReviewApiClient {
    pub fn new(http: Arc<HttpClient>, api: ApiConfig, retry: RetryPolicy) -> Self {
        Self { http, api, retry }
    }

    /// One POST attempt: send the body, validate the response shape and
    /// classify failures as transport (transient) or API (terminal).
    async fn send_page_request(
        &self,
        body: &ReviewListRequest,
        referer: &str,
        attempt: u32,
    ) -> ScrapeResult<Value> {
        self.http.throttle().await;
        debug!(
            "Requesting review page (skip {}, attempt {})",
            body.variables.input.skip, attempt
        );

        let mut request = self.http.inner().post(&self.api.endpoint);
        for (name, value) in self.api.static_headers() {
            request = request.header(name, value);
        }
        request = request.header("referer", referer);

        let response = request.json(body).send().await.map_err(|err| {
            ScrapeError::transport(
                format!("transport error: {err}"),
                err.status().map(|s| s.as_u16()),
                None,
            )
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            ScrapeError::transport(format!("failed to read response body: {err}"), Some(status.as_u16()), None)
        })?;

        if !status.is_success() {
            return Err(ScrapeError::api(
                format!("HTTP {status} from review API"),
                Some(status.as_u16()),
                Some(truncate(&text, 1000)),
            ));
        }

        let data: Value = serde_json::from_str(&text).map_err(|err| {
            ScrapeError::api(
                format!("invalid JSON in response: {err}"),
                Some(status.as_u16()),
                Some(truncate(&text, 1000)),
            )
        })?;

        if let Some(errors) = data.get("errors").and_then(Value::as_array) {
            let messages: Vec<&str> = errors
                .iter()
                .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
                .collect();
            return Err(ScrapeError::api(
                format!("GraphQL errors: {}", messages.join(", ")),
                Some(status.as_u16()),
                Some(truncate(&text, 1000)),
            ));
        }

        let frontend = data.pointer("/data/reviewListFrontend");
        match frontend {
            Some(node) if node.is_object() => {
                // The error payload shares the field with the result object.
                if let Some(code) = node.get("statusCode").and_then(Value::as_i64) {
                    let message = node
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    return Err(ScrapeError::api(
                        format!("frontend error: {message}"),
                        u16::try_from(code).ok(),
                        Some(truncate(&text, 1000)),
                    ));
                }
                Ok(data)
            }
            _ => Err(ScrapeError::api(
                "missing reviewListFrontend data in response",
                Some(status.as_u16()),
                Some(truncate(&text, 1000)),
            )),
        }
    }
}

#[async_trait]
impl ReviewPageFetcher for ReviewApiClient {
    async fn fetch_hotel_info(&self, url: &str) -> ScrapeResult<HotelInfo> {
        let html = self.http.get_text(url).await.map_err(|err| {
            ScrapeError::transport(format!("failed to fetch hotel page: {err:#}"), None, None)
        })?;

        let data = hotel_page::extract_embedded_object(&html).ok_or_else(|| {
            ScrapeError::Validation("could not extract hotel data from page".to_string())
        })?;
        hotel_page::parse_hotel_info(&data, url)
    }

    async fn fetch_review_page(
        &self,
        info: &HotelInfo,
        query: &PageQuery,
    ) -> ScrapeResult<Value> {
        // Required identity fields gate the network call entirely.
        info.identity
            .validate()
            .map_err(ScrapeError::Validation)?;

        let body = ReviewListRequest::new(&info.identity, query);
        with_retries(&self.retry, |attempt| {
            self.send_page_request(&body, &info.page_url, attempt)
        })
        .await
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filters::{CustomerType, ScoreRange, SortOrder, TimeOfYear};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn identity() -> HotelIdentity {
        HotelIdentity {
            hotel_id: 1377059,
            ufi: 900040497,
            country_code: "eg".into(),
        }
    }

    fn page_query() -> PageQuery {
        PageQuery {
            sort: SortOrder::NewestFirst,
            skip: 20,
            limit: 10,
            time_of_year: TimeOfYear::All,
            customer_type: CustomerType::All,
            score_range: ScoreRange::All,
            languages: vec!["en".into(), "de".into()],
        }
    }

    #[test]
    fn request_body_carries_identity_and_pagination() {
        let body = ReviewListRequest::new(&identity(), &page_query());
        let value = serde_json::to_value(&body).unwrap();
        let input = &value["variables"]["input"];

        assert_eq!(input["hotelId"], 1377059);
        assert_eq!(input["ufi"], 900040497);
        assert_eq!(input["hotelCountryCode"], "eg");
        assert_eq!(input["sorter"], "NEWEST_FIRST");
        assert_eq!(input["skip"], 20);
        assert_eq!(input["limit"], 10);
        assert_eq!(value["operationName"], "ReviewList");
    }

    #[test]
    fn all_sentinel_filters_are_omitted_from_the_body() {
        let body = ReviewListRequest::new(&identity(), &page_query());
        let value = serde_json::to_value(&body).unwrap();
        let filters = value["variables"]["input"]["filters"].as_object().unwrap();

        assert!(!filters.contains_key("customerType"));
        assert!(!filters.contains_key("timeOfYear"));
        assert!(!filters.contains_key("scoreRange"));
        assert_eq!(filters["languages"], serde_json::json!(["en", "de"]));
    }

    #[test]
    fn non_default_filters_are_serialized() {
        let mut query = page_query();
        query.customer_type = CustomerType::Couples;
        query.score_range = ScoreRange::Wonderful;
        let body = ReviewListRequest::new(&identity(), &query);
        let value = serde_json::to_value(&body).unwrap();
        let filters = &value["variables"]["input"]["filters"];

        assert_eq!(filters["customerType"], "COUPLES");
        assert_eq!(filters["scoreRange"], "REVIEW_ADJ_SUPERB");
    }

    #[test]
    fn backoff_grows_exponentially_with_bounded_jitter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        };
        let first = policy.backoff_delay(1);
        let second = policy.backoff_delay(2);
        assert!(first >= Duration::from_secs(1) && first < Duration::from_millis(1100));
        assert!(second >= Duration::from_secs(2) && second < Duration::from_millis(2200));
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);

        let result = with_retries(&policy, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ScrapeError::transport("timed out", None, None))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: ScrapeResult<()> = with_retries(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ScrapeError::api("frontend error", Some(400), None)) }
        })
        .await;

        assert!(matches!(result, Err(ScrapeError::Request { transient: false, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_report_the_attempt_count() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };

        let result: ScrapeResult<()> = with_retries(&policy, |_| async {
            Err(ScrapeError::transport("connection refused", Some(502), None))
        })
        .await;

        match result {
            Err(ScrapeError::Request { message, status, .. }) => {
                assert!(message.contains("after 3 attempts"));
                assert_eq!(status, Some(502));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 4), "abcd");
        assert_eq!(truncate("ab", 4), "ab");
        // Multi-byte character straddling the cut point.
        let s = "aé";
        assert_eq!(truncate(s, 2), "a");
    }
}
