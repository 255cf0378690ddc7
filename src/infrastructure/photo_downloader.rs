//! Review photo downloads
//!
//! Photos are strictly best-effort: one attempt per URL, failures logged and
//! skipped. A failed or partial photo set never affects the crawl or the
//! stored review row.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::infrastructure::file_store::sanitize_filename;
use crate::infrastructure::http_client::HttpClient;

/// Downloads one review's photo set concurrently into a per-hotel directory.
pub struct PhotoDownloader {
    http: Arc<HttpClient>,
    photos_dir: PathBuf,
    downloaded: AtomicU64,
    failed: AtomicU64,
}

impl PhotoDownloader {
    pub fn new(http: Arc<HttpClient>, photos_dir: PathBuf) -> Self {
        Self {
            http,
            photos_dir,
            downloaded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Fetch every photo of one review concurrently. Returns the number of
    /// files written.
    pub async fn download_review_photos(
        &self,
        hotel_name: &str,
        review_url: &str,
        photo_urls: &[String],
    ) -> u64 {
        if photo_urls.is_empty() {
            return 0;
        }

        let dir = self.photos_dir.join(sanitize_filename(hotel_name));
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!("Failed to create photo directory {}: {err}", dir.display());
            self.failed.fetch_add(photo_urls.len() as u64, Ordering::Relaxed);
            return 0;
        }

        let review_tag = sanitize_filename(review_url);
        let tasks = photo_urls.iter().enumerate().map(|(index, url)| {
            let path = dir.join(format!("review_{review_tag}_photo_{}.jpg", index + 1));
            self.download_one(url, path)
        });

        let written = join_all(tasks).await.into_iter().filter(|ok| *ok).count() as u64;
        self.downloaded.fetch_add(written, Ordering::Relaxed);
        self.failed
            .fetch_add(photo_urls.len() as u64 - written, Ordering::Relaxed);
        written
    }

    /// Single attempt; any failure is logged and reported as `false`.
    async fn download_one(&self, url: &str, path: PathBuf) -> bool {
        if path.exists() {
            debug!("Photo already on disk: {}", path.display());
            return true;
        }

        let response = match self.http.get(url).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Photo download failed for {url}: {err:#}");
                return false;
            }
        };
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Photo body read failed for {url}: {err}");
                return false;
            }
        };
        if let Err(err) = tokio::fs::write(&path, &bytes).await {
            warn!("Failed to write photo {}: {err}", path.display());
            return false;
        }
        debug!("Saved photo {} ({} bytes)", path.display(), bytes.len());
        true
    }

    /// (downloaded, failed) totals since construction, for the run summary.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.downloaded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    fn downloader(dir: &Path) -> PhotoDownloader {
        let http = Arc::new(HttpClient::new(HttpClientConfig::default()).unwrap());
        PhotoDownloader::new(http, dir.to_path_buf())
    }

    #[tokio::test]
    async fn empty_photo_set_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let downloader = downloader(tmp.path());
        let written = downloader
            .download_review_photos("Golden Oasis", "/r/1", &[])
            .await;
        assert_eq!(written, 0);
        assert_eq!(downloader.totals(), (0, 0));
    }

    #[tokio::test]
    async fn unreachable_urls_are_counted_as_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let downloader = downloader(tmp.path());
        let urls = vec!["http://127.0.0.1:1/pic.jpg".to_string()];
        let written = downloader
            .download_review_photos("Golden Oasis", "/r/1", &urls)
            .await;
        assert_eq!(written, 0);
        assert_eq!(downloader.totals(), (0, 1));
        assert!(tmp.path().join("Golden Oasis").is_dir());
    }
}
