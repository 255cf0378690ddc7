//! Error taxonomy for the crawl pipeline
//!
//! Four categories cross component boundaries: validation failures are
//! surfaced immediately and never retried, request failures carry the last
//! HTTP status and body and are split into transient (transport) and
//! terminal (API error payload) flavors, storage failures trigger a backup
//! write upstream, and cancellation is reported per hotel.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Malformed input to a component (missing hotel identity fields,
    /// unparseable page data). Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network or API failure while talking to the review source.
    #[error("request failed: {message}")]
    Request {
        message: String,
        status: Option<u16>,
        body: Option<String>,
        /// Transport failures are retried with backoff; structured error
        /// payloads from the API are terminal for the page.
        transient: bool,
    },

    /// Transaction or commit failure in the dedup store.
    #[error("storage error: {0}")]
    Storage(String),

    /// The loop observed the shutdown signal.
    #[error("task cancelled")]
    Cancelled,

    /// Task-level failure outside the taxonomy (e.g. a panicked worker).
    #[error("{0}")]
    Internal(String),
}

impl ScrapeError {
    /// Transport-level request failure, eligible for retry with backoff.
    pub fn transport(message: impl Into<String>, status: Option<u16>, body: Option<String>) -> Self {
        Self::Request {
            message: message.into(),
            status,
            body,
            transient: true,
        }
    }

    /// Application-level error reported by the source API. Not retried.
    pub fn api(message: impl Into<String>, status: Option<u16>, body: Option<String>) -> Self {
        Self::Request {
            message: message.into(),
            status,
            body,
            transient: false,
        }
    }

    /// Whether the retry loop should attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request { transient: true, .. })
    }
}

impl From<sqlx::Error> for ScrapeError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
