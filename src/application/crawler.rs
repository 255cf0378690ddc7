//! Crawl orchestration
//!
//! One pagination loop per hotel plus a coordinator that runs hotels in
//! bounded concurrent groups. The loop is a small state machine: a 0-based
//! page cursor that advances only on success, a consecutive-error counter
//! with a hard threshold, and explicit stop reasons. All source access goes
//! through the [`ReviewPageFetcher`] and [`ReviewStore`] seams so the state
//! machine is tested with scripted implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::entities::{Hotel, HotelInfo};
use crate::domain::errors::{ScrapeError, ScrapeResult};
use crate::domain::filters::{CustomerType, ScoreRange, SortOrder, TimeOfYear};
use crate::domain::repositories::{PageQuery, ReviewPageFetcher, ReviewStore};
use crate::infrastructure::file_store::FileStore;
use crate::infrastructure::response_parser;

/// Tunables for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub sort: SortOrder,
    /// Reviews per page, 1 to 25.
    pub page_size: i64,
    /// 1-based page to start from.
    pub start_page: u32,
    /// Maximum pages attempted per hotel (failed attempts count).
    pub max_pages: u32,
    /// Consecutive page failures before the hotel is abandoned.
    pub max_consecutive_errors: u32,
    /// Attempts for the initial hotel page fetch.
    pub max_retries: u32,
    /// Delay between hotel page fetch attempts.
    pub retry_delay: Duration,
    /// Randomized pause between page requests, in milliseconds. `(0, 0)`
    /// disables the pause.
    pub page_delay_ms: (u64, u64),
    /// Hotels crawled at the same time.
    pub concurrency: usize,
    pub time_of_year: TimeOfYear,
    pub customer_type: CustomerType,
    pub score_range: ScoreRange,
    pub languages: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            sort: SortOrder::NewestFirst,
            page_size: 10,
            start_page: 1,
            max_pages: 1,
            max_consecutive_errors: 3,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            page_delay_ms: (1000, 3000),
            concurrency: 3,
            time_of_year: TimeOfYear::All,
            customer_type: CustomerType::All,
            score_range: ScoreRange::All,
            languages: Vec::new(),
        }
    }
}

/// Why a hotel's pagination loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned an empty page: no reviews remain.
    Exhausted,
    /// The very first page was already empty.
    NoReviews,
    /// The configured page limit was reached.
    PageLimit,
    /// Too many consecutive page failures.
    TooManyErrors,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Exhausted => "all reviews fetched",
            Self::NoReviews => "no reviews found",
            Self::PageLimit => "page limit reached",
            Self::TooManyErrors => "too many consecutive errors",
        };
        f.write_str(text)
    }
}

/// Outcome of one hotel's crawl.
#[derive(Debug, Clone)]
pub struct HotelCrawlResult {
    pub url: String,
    pub hotel_name: String,
    pub pages_processed: u32,
    pub reviews_fetched: u64,
    pub added: u64,
    pub skipped: u64,
    pub stop: StopReason,
}

/// Runs the pagination loop for each hotel URL.
#[derive(Clone)]
pub struct HotelCrawler {
    fetcher: Arc<dyn ReviewPageFetcher>,
    store: Arc<dyn ReviewStore>,
    files: Option<Arc<FileStore>>,
    config: CrawlerConfig,
}

impl HotelCrawler {
    pub fn new(
        fetcher: Arc<dyn ReviewPageFetcher>,
        store: Arc<dyn ReviewStore>,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            files: None,
            config,
        }
    }

    /// Enable raw page snapshots and storage-failure backups.
    pub fn with_file_store(mut self, files: Arc<FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    /// Crawl all URLs in groups of at most `concurrency`, sequentially
    /// between groups. Each URL gets an independent outcome; one hotel's
    /// failure never affects the others.
    pub async fn run(
        &self,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> BTreeMap<String, ScrapeResult<HotelCrawlResult>> {
        let mut results = BTreeMap::new();
        let group_size = self.config.concurrency.clamp(1, 5);

        for group in urls.chunks(group_size) {
            if cancel.is_cancelled() {
                for url in group {
                    results.insert(url.clone(), Err(ScrapeError::Cancelled));
                }
                continue;
            }

            let tasks: Vec<_> = group
                .iter()
                .map(|url| {
                    let crawler = self.clone();
                    let url = url.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move { crawler.process_hotel(&url, &cancel).await })
                })
                .collect();

            for (url, joined) in group.iter().zip(join_all(tasks).await) {
                let outcome = match joined {
                    Ok(result) => result,
                    Err(err) => {
                        error!("Crawl task for {url} panicked: {err}");
                        Err(ScrapeError::Internal(format!("crawl task failed: {err}")))
                    }
                };
                results.insert(url.clone(), outcome);
                // Throttle between completions as well as between pages.
                if !cancel.is_cancelled() {
                    self.pause_between_pages().await;
                }
            }
        }
        results
    }

    /// Crawl one hotel: resolve its identity, then walk review pages until a
    /// stop condition is met. Everything persisted before a failure stays
    /// persisted.
    pub async fn process_hotel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> ScrapeResult<HotelCrawlResult> {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        let info = self.fetch_hotel_info_with_retry(url, cancel).await?;
        info!(
            "Crawling {} (hotel {} in {})",
            info.name, info.identity.hotel_id, info.country_name
        );

        let mut cursor = i64::from(self.config.start_page.saturating_sub(1));
        let mut pages_processed = 0u32;
        let mut consecutive_errors = 0u32;
        let mut reviews_fetched = 0u64;
        let mut added = 0u64;
        let mut skipped = 0u64;
        let mut hotel_row: Option<Hotel> = None;
        // Total review count reported by the source, recorded from the
        // first successful page; bounds the crawl.
        let mut total_reported: Option<i64> = None;

        let stop = loop {
            if cancel.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            if total_reported.is_some_and(|total| cursor * self.config.page_size >= total) {
                break StopReason::Exhausted;
            }
            if pages_processed >= self.config.max_pages {
                break StopReason::PageLimit;
            }
            pages_processed += 1;

            let query = PageQuery {
                sort: self.config.sort,
                skip: cursor * self.config.page_size,
                limit: self.config.page_size,
                time_of_year: self.config.time_of_year,
                customer_type: self.config.customer_type,
                score_range: self.config.score_range,
                languages: self.config.languages.clone(),
            };

            let page = match self.fetcher.fetch_review_page(&info, &query).await {
                Ok(page) => page,
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(
                        "Page at skip {} failed for {} ({consecutive_errors}/{}): {err}",
                        query.skip, info.name, self.config.max_consecutive_errors
                    );
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        break StopReason::TooManyErrors;
                    }
                    // Cursor stays put: the same page is retried next round.
                    self.pause_between_pages().await;
                    continue;
                }
            };
            consecutive_errors = 0;

            if let Some(files) = &self.files {
                files
                    .save_page_snapshot(&info.name, u32::try_from(cursor + 1).unwrap_or(0), &page)
                    .await;
            }

            let parsed = response_parser::parse_reviews(&page);
            for rejection in &parsed.rejections {
                warn!(
                    "Dropped review entry {} on page {} of {}: {}",
                    rejection.index,
                    cursor + 1,
                    info.name,
                    rejection.reason
                );
            }

            if parsed.records.is_empty() && parsed.rejections.is_empty() {
                break if reviews_fetched == 0 {
                    StopReason::NoReviews
                } else {
                    StopReason::Exhausted
                };
            }

            if total_reported.is_none() {
                let stats = response_parser::extract_stats(&page);
                let total = if stats.reviews_count > 0 {
                    stats.reviews_count
                } else {
                    stats.total_reviews()
                };
                if total > 0 {
                    total_reported = Some(total);
                }
            }

            let hotel = match &hotel_row {
                Some(hotel) => hotel.clone(),
                None => {
                    let stats = response_parser::extract_stats(&page);
                    match self.store.save_hotel_snapshot(&stats, &info).await {
                        Ok(hotel) => {
                            hotel_row = Some(hotel.clone());
                            hotel
                        }
                        Err(err) => {
                            if let Some(reason) = self
                                .handle_storage_failure(&info, &parsed.records, err, &mut consecutive_errors)
                                .await
                            {
                                break reason;
                            }
                            continue;
                        }
                    }
                }
            };

            reviews_fetched += parsed.records.len() as u64;
            if !parsed.records.is_empty() {
                match self.store.save_reviews(&parsed.records, &hotel).await {
                    Ok((page_added, page_skipped)) => {
                        added += page_added;
                        skipped += page_skipped;
                    }
                    Err(err) => {
                        // The page itself was fine; back it up and move on.
                        if let Some(reason) = self
                            .handle_storage_failure(&info, &parsed.records, err, &mut consecutive_errors)
                            .await
                        {
                            break reason;
                        }
                        cursor += 1;
                        continue;
                    }
                }
            }

            cursor += 1;
            self.pause_between_pages().await;
        };

        info!(
            "Finished {}: {} pages, {} fetched, {} added, {} skipped ({})",
            info.name, pages_processed, reviews_fetched, added, skipped, stop
        );
        Ok(HotelCrawlResult {
            url: url.to_string(),
            hotel_name: info.name,
            pages_processed,
            reviews_fetched,
            added,
            skipped,
            stop,
        })
    }

    async fn fetch_hotel_info_with_retry(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> ScrapeResult<HotelInfo> {
        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }
            match self.fetcher.fetch_hotel_info(url).await {
                Ok(info) => return Ok(info),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!("Hotel page fetch attempt {attempt}/{attempts} failed for {url}: {err}");
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(ScrapeError::Internal(format!(
            "hotel page fetch retries exhausted for {url}"
        )))
    }

    /// Back up the page's reviews, bump the error counter and report the
    /// stop reason once the threshold is hit.
    async fn handle_storage_failure(
        &self,
        info: &HotelInfo,
        records: &[crate::domain::entities::ReviewRecord],
        err: ScrapeError,
        consecutive_errors: &mut u32,
    ) -> Option<StopReason> {
        warn!("Storage failure for {}: {err}", info.name);
        if let Some(files) = &self.files {
            if !records.is_empty() {
                if let Err(backup_err) = files.save_backup(&info.name, records).await {
                    error!("Backup also failed for {}: {backup_err:#}", info.name);
                }
            }
        }
        *consecutive_errors += 1;
        (*consecutive_errors >= self.config.max_consecutive_errors)
            .then_some(StopReason::TooManyErrors)
    }

    async fn pause_between_pages(&self) {
        let (low, high) = self.config.page_delay_ms;
        if high == 0 {
            return;
        }
        let millis = if high > low { fastrand::u64(low..=high) } else { low };
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}
