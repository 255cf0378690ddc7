//! Application configuration
//!
//! All previously ambient settings (endpoint, headers, directories, retry
//! policy) live in one explicitly constructed object that is passed to each
//! component at creation, keeping components independently testable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub request: RequestConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
}

/// Review API endpoint and static request headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub endpoint: String,
    pub origin: String,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.booking.com/dml/graphql".to_string(),
            origin: "https://www.booking.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl ApiConfig {
    /// Static headers sent with every API call. The referer is added per
    /// request from the hotel's page URL.
    pub fn static_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("accept", "*/*".to_string()),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            ("content-type", "application/json".to_string()),
            ("origin", self.origin.clone()),
            ("user-agent", self.user_agent.clone()),
        ]
    }
}

/// Timeouts and retry policy for outbound requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Per-HTTP-call timeout.
    pub timeout_seconds: u64,
    /// Maximum attempts for transport failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay_ms: u64,
    /// Request-rate ceiling for the shared client.
    pub max_requests_per_second: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_requests_per_second: 4,
        }
    }
}

impl RequestConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// SQLite pool and write batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// Pool exhaustion blocks acquisition up to this long before failing.
    pub acquire_timeout_seconds: u64,
    /// Review insert batch size (one transaction per batch).
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database/hotels_reviews.db"),
            max_connections: 20,
            acquire_timeout_seconds: 30,
            batch_size: 50,
        }
    }
}

impl StorageConfig {
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path.display())
    }
}

/// Output directory layout for file artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub root: PathBuf,
    pub logs: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
            logs: PathBuf::from("logs"),
        }
    }
}

impl OutputConfig {
    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.root.join("photos")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.root.join("export")
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs
    }

    /// Create the output tree, failing early if it is not writable.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.json_dir(),
            self.photos_dir(),
            self.export_dir(),
            self.logs.clone(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}
