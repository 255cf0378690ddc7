//! File artifacts: raw page snapshots and failure backups

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::entities::ReviewRecord;

/// Replace filesystem-hostile characters so any hotel name or review URL can
/// become part of a file name.
pub fn sanitize_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

/// Writes raw page payloads and review backups under the output tree.
pub struct FileStore {
    json_dir: PathBuf,
}

impl FileStore {
    pub fn new(json_dir: PathBuf) -> Self {
        Self { json_dir }
    }

    /// Persist one raw page payload under a per-hotel directory. Snapshot
    /// failures are logged and swallowed, they never stop a crawl.
    pub async fn save_page_snapshot(&self, hotel_name: &str, page_number: u32, payload: &Value) {
        if let Err(err) = self.write_snapshot(hotel_name, page_number, payload).await {
            warn!("Failed to save page snapshot for {hotel_name} page {page_number}: {err:#}");
        }
    }

    async fn write_snapshot(&self, hotel_name: &str, page_number: u32, payload: &Value) -> Result<()> {
        let dir = self.json_dir.join(sanitize_filename(hotel_name));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;

        let path = dir.join(format!("page_{page_number:04}.json"));
        let body = serde_json::to_vec_pretty(payload).context("failed to encode page payload")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Dump reviews that could not be persisted so nothing fetched is lost.
    /// Returns the backup path for the log line.
    pub async fn save_backup(&self, hotel_name: &str, reviews: &[ReviewRecord]) -> Result<PathBuf> {
        let dir = self.json_dir.join("backups");
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create backup directory {}", dir.display()))?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{stamp}.json", sanitize_filename(hotel_name)));
        let body = serde_json::to_vec_pretty(reviews).context("failed to encode review backup")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!("Backed up {} reviews to {}", reviews.len(), path.display());
        Ok(path)
    }

    pub fn json_dir(&self) -> &Path {
        &self.json_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_replaces_hostile_characters() {
        assert_eq!(sanitize_filename("Hotel: The/Best?"), "Hotel_ The_Best_");
        assert_eq!(sanitize_filename("  .hidden.  "), "hidden");
        assert_eq!(sanitize_filename("///"), "___");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).len(), 120);
    }

    #[tokio::test]
    async fn snapshots_land_in_per_hotel_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());

        store
            .save_page_snapshot("Golden Oasis", 3, &json!({"data": {"reviewsCount": 1}}))
            .await;

        let path = tmp.path().join("Golden Oasis").join("page_0003.json");
        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(body.contains("reviewsCount"));
    }

    #[tokio::test]
    async fn backups_are_written_and_named_after_the_hotel() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());

        let review = ReviewRecord {
            review_url: "/r/1".to_string(),
            ..Default::default()
        };
        let path = store.save_backup("Golden Oasis", &[review]).await.unwrap();

        assert!(path.starts_with(tmp.path().join("backups")));
        let body = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(body.contains("/r/1"));
    }
}
