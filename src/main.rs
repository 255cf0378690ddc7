//! Command-line entry point for the review crawler.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use review_harvest::application::{CrawlerConfig, HotelCrawler};
use review_harvest::domain::filters::{CustomerType, ScoreRange, SortOrder, TimeOfYear};
use review_harvest::infrastructure::config::AppConfig;
use review_harvest::infrastructure::database_connection::DatabaseConnection;
use review_harvest::infrastructure::export::Exporter;
use review_harvest::infrastructure::file_store::FileStore;
use review_harvest::infrastructure::hotel_page;
use review_harvest::infrastructure::http_client::{HttpClient, HttpClientConfig};
use review_harvest::infrastructure::logging::init_logging;
use review_harvest::infrastructure::photo_downloader::PhotoDownloader;
use review_harvest::infrastructure::review_api::{ReviewApiClient, RetryPolicy};
use review_harvest::infrastructure::review_repository::ReviewRepository;
use review_harvest::ScrapeError;

/// Fetch hotel reviews into a local SQLite database.
#[derive(Debug, Parser)]
#[command(name = "review-harvest", version, about)]
struct Cli {
    /// Hotel page URLs, comma separated.
    #[arg(value_delimiter = ',', value_name = "URL")]
    urls: Vec<String>,

    /// Review sort order.
    #[arg(short, long, value_enum, default_value_t = SortOrder::NewestFirst)]
    sort: SortOrder,

    /// Reviews per page.
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(i64).range(1..=25))]
    page_size: i64,

    /// 1-based page to start from.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    start_page: u32,

    /// Maximum pages to fetch per hotel.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: u32,

    /// Hotels crawled concurrently.
    #[arg(short = 'n', long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..=5))]
    concurrent: u64,

    /// Restrict reviews to these languages (two-letter codes, comma
    /// separated). Empty means all languages.
    #[arg(short, long, value_delimiter = ',', value_name = "LANG")]
    languages: Vec<String>,

    /// Seasonal filter.
    #[arg(short, long, value_enum, default_value_t = TimeOfYear::All)]
    time_of_year: TimeOfYear,

    /// Customer type filter.
    #[arg(short = 'u', long, value_enum, default_value_t = CustomerType::All)]
    customer_type: CustomerType,

    /// Score range filter.
    #[arg(short = 'r', long, value_enum, default_value_t = ScoreRange::All)]
    score_range: ScoreRange,

    /// Download review photos alongside the reviews.
    #[arg(long)]
    download_images: bool,

    /// Export database contents to CSV when done: "all" or one table name.
    #[arg(long, value_name = "TABLE")]
    export: Option<String>,

    /// Base name for the export file or directory.
    #[arg(long, default_value = "reviews_export")]
    export_name: String,

    /// Disable debug-level logging.
    #[arg(long)]
    no_debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the crawl finished but at least one hotel failed.
async fn run(cli: Cli) -> Result<bool> {
    if cli.urls.is_empty() && cli.export.is_none() {
        bail!("nothing to do: pass at least one hotel URL or --export");
    }

    let urls = normalize_urls(&cli.urls)?;
    let languages = normalize_languages(&cli.languages)?;

    let config = AppConfig::default();
    config.output.ensure_directories()?;
    let _log_guard = init_logging(config.output.logs_dir(), !cli.no_debug)?;

    let db = DatabaseConnection::new(&config.storage).await?;
    db.migrate().await?;

    let mut all_succeeded = true;
    if !urls.is_empty() {
        all_succeeded = crawl(&cli, &config, &db, urls, languages).await?;
    }

    if let Some(target) = &cli.export {
        let exporter = Exporter::new(db.pool(), config.output.export_dir());
        if target.eq_ignore_ascii_case("all") {
            let path = exporter.export_all(&cli.export_name).await?;
            println!("Exported all tables to {}", path.display());
        } else {
            let path = exporter.export_table(target, &cli.export_name).await?;
            println!("Exported {target} to {}", path.display());
        }
    }

    Ok(all_succeeded)
}

async fn crawl(
    cli: &Cli,
    config: &AppConfig,
    db: &DatabaseConnection,
    urls: Vec<String>,
    languages: Vec<String>,
) -> Result<bool> {
    let http = Arc::new(HttpClient::new(HttpClientConfig {
        user_agent: config.api.user_agent.clone(),
        timeout_seconds: config.request.timeout_seconds,
        max_requests_per_second: config.request.max_requests_per_second,
        follow_redirects: true,
    })?);

    let fetcher = Arc::new(ReviewApiClient::new(
        http.clone(),
        config.api.clone(),
        RetryPolicy {
            max_attempts: config.request.max_retries,
            base_delay: config.request.retry_delay(),
        },
    ));

    let photo_downloader = cli.download_images.then(|| {
        Arc::new(PhotoDownloader::new(http.clone(), config.output.photos_dir()))
    });

    let mut repository = ReviewRepository::new(db.pool(), config.storage.batch_size);
    if let Some(downloader) = &photo_downloader {
        repository = repository.with_photo_downloader(downloader.clone());
    }

    let files = Arc::new(FileStore::new(config.output.json_dir()));
    let crawler_config = CrawlerConfig {
        sort: cli.sort,
        page_size: cli.page_size,
        start_page: cli.start_page,
        max_pages: cli.max_pages,
        max_retries: config.request.max_retries,
        retry_delay: config.request.retry_delay(),
        concurrency: cli.concurrent as usize,
        time_of_year: cli.time_of_year,
        customer_type: cli.customer_type,
        score_range: cli.score_range,
        languages,
        ..CrawlerConfig::default()
    };
    let crawler =
        HotelCrawler::new(fetcher, Arc::new(repository), crawler_config).with_file_store(files);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown signal received; letting in-flight work finish");
                cancel.cancel();
            }
        });
    }

    info!("Starting crawl of {} hotel(s)", urls.len());
    let started = std::time::Instant::now();
    let results = crawler.run(&urls, &cancel).await;
    let elapsed = started.elapsed();

    let mut failed = 0usize;
    println!("\nCrawl summary ({:.1}s):", elapsed.as_secs_f64());
    for (url, outcome) in &results {
        match outcome {
            Ok(result) => println!(
                "  {}: {} pages, {} reviews fetched, {} added, {} skipped ({})",
                result.hotel_name,
                result.pages_processed,
                result.reviews_fetched,
                result.added,
                result.skipped,
                result.stop
            ),
            Err(ScrapeError::Cancelled) => {
                failed += 1;
                println!("  {url}: cancelled");
            }
            Err(err) => {
                failed += 1;
                println!("  {url}: failed ({err})");
            }
        }
    }
    if let Some(downloader) = &photo_downloader {
        let (downloaded, photo_failures) = downloader.totals();
        println!("  Photos: {downloaded} downloaded, {photo_failures} failed");
    }
    println!(
        "  {} hotel(s) succeeded, {} failed; logs in {}",
        results.len() - failed,
        failed,
        config.output.logs_dir().display()
    );

    Ok(failed == 0)
}

/// Validate and canonicalize hotel page URLs: must be hotel pages on the
/// source site; query strings are stripped.
fn normalize_urls(raw: &[String]) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(raw.len());
    for candidate in raw {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        let parsed = url::Url::parse(candidate)
            .with_context(|| format!("invalid URL: {candidate}"))?;
        let host_ok = parsed
            .host_str()
            .is_some_and(|h| h == "booking.com" || h.ends_with(".booking.com"));
        if !host_ok || !parsed.path().starts_with("/hotel/") {
            bail!("not a hotel page URL: {candidate}");
        }
        urls.push(hotel_page::clear_url_query_params(candidate));
    }
    Ok(urls)
}

/// Language filters must be two-letter codes; they are lower-cased for the
/// request body.
fn normalize_languages(raw: &[String]) -> Result<Vec<String>> {
    let mut languages = Vec::with_capacity(raw.len());
    for code in raw {
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("invalid language code: {code}");
        }
        languages.push(code.to_lowercase());
    }
    Ok(languages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn urls_are_validated_and_stripped() {
        let urls = normalize_urls(&[
            "https://www.booking.com/hotel/eg/oasis.html?aid=1".to_string(),
            "https://booking.com/hotel/us/inn.html".to_string(),
        ])
        .unwrap();
        assert_eq!(urls[0], "https://www.booking.com/hotel/eg/oasis.html");
        assert_eq!(urls.len(), 2);

        assert!(normalize_urls(&["https://example.com/hotel/eg/x.html".to_string()]).is_err());
        assert!(normalize_urls(&["https://www.booking.com/index.html".to_string()]).is_err());
        assert!(normalize_urls(&["not a url".to_string()]).is_err());
    }

    #[test]
    fn language_codes_are_checked_and_lowercased() {
        let langs = normalize_languages(&["EN".to_string(), "de".to_string()]).unwrap();
        assert_eq!(langs, vec!["en", "de"]);
        assert!(normalize_languages(&["eng".to_string()]).is_err());
        assert!(normalize_languages(&["e1".to_string()]).is_err());
    }

    #[test]
    fn comma_separated_urls_are_split() {
        let cli = Cli::parse_from([
            "review-harvest",
            "https://www.booking.com/hotel/eg/a.html,https://www.booking.com/hotel/eg/b.html",
            "-m",
            "5",
            "-n",
            "2",
        ]);
        assert_eq!(cli.urls.len(), 2);
        assert_eq!(cli.max_pages, 5);
        assert_eq!(cli.concurrent, 2);
    }

    #[test]
    fn out_of_range_concurrency_is_rejected() {
        let url = "https://www.booking.com/hotel/eg/a.html";
        assert!(Cli::try_parse_from(["review-harvest", url, "-n", "6"]).is_err());
        assert!(Cli::try_parse_from(["review-harvest", url, "-n", "0"]).is_err());
        assert!(Cli::try_parse_from(["review-harvest", url, "-n", "5"]).is_ok());
    }
}
