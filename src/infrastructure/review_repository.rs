//! Persistent review store over SQLite
//!
//! Sole writer of the hotels, reviews and aggregate tables. Hotel snapshots
//! replace aggregates atomically; reviews are insert-only, deduplicated by
//! review URL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::entities::{Hotel, HotelInfo, HotelStats, ReviewRecord};
use crate::domain::errors::{ScrapeError, ScrapeResult};
use crate::domain::repositories::ReviewStore;
use crate::infrastructure::photo_downloader::PhotoDownloader;

pub struct ReviewRepository {
    pool: Arc<SqlitePool>,
    batch_size: usize,
    /// When set, photos of newly added reviews are fetched after each batch
    /// commits. Download failures never affect stored rows.
    photo_downloader: Option<Arc<PhotoDownloader>>,
}

impl ReviewRepository {
    pub fn new(pool: Arc<SqlitePool>, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            photo_downloader: None,
        }
    }

    pub fn with_photo_downloader(mut self, downloader: Arc<PhotoDownloader>) -> Self {
        self.photo_downloader = Some(downloader);
        self
    }

    async fn insert_aggregates(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        stats: &HotelStats,
        hotel_fk: i64,
    ) -> Result<(), sqlx::Error> {
        for table in [
            "customer_type_filters",
            "language_filters",
            "rating_scores",
            "topic_filters",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE hotel_fk = ?"))
                .bind(hotel_fk)
                .execute(&mut **tx)
                .await?;
        }

        for bucket in &stats.customer_type_filter {
            sqlx::query(
                "INSERT INTO customer_type_filters (hotel_fk, name, value, count) VALUES (?, ?, ?, ?)",
            )
            .bind(hotel_fk)
            .bind(clean_bucket_name(&bucket.name))
            .bind(&bucket.value)
            .bind(bucket.count)
            .execute(&mut **tx)
            .await?;
        }

        for bucket in &stats.language_filter {
            sqlx::query(
                "INSERT INTO language_filters (hotel_fk, name, value, count, country_flag) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(hotel_fk)
            .bind(clean_bucket_name(&bucket.name))
            .bind(&bucket.value)
            .bind(bucket.count)
            .bind(&bucket.country_flag)
            .execute(&mut **tx)
            .await?;
        }

        for score in &stats.rating_scores {
            sqlx::query(
                "INSERT INTO rating_scores (hotel_fk, name, translation, value) VALUES (?, ?, ?, ?)",
            )
            .bind(hotel_fk)
            .bind(&score.name)
            .bind(&score.translation)
            .bind(score.value)
            .execute(&mut **tx)
            .await?;
        }

        for topic in &stats.topic_filters {
            sqlx::query(
                "INSERT INTO topic_filters \
                 (hotel_fk, topic_id, name, translation_id, translation_name, is_selected) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(hotel_fk)
            .bind(topic.id)
            .bind(&topic.name)
            .bind(&topic.translation_id)
            .bind(&topic.translation_name)
            .bind(topic.is_selected)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn insert_review(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        review: &ReviewRecord,
        hotel_fk: i64,
    ) -> Result<(), sqlx::Error> {
        let photo_urls = serde_json::to_string(&review.photo_urls).unwrap_or_default();
        let raw_payload = serde_json::to_string(&review.raw).unwrap_or_default();

        sqlx::query(
            "INSERT INTO reviews \
             (hotel_fk, review_url, username, country_code, country_name, reviewed_date, \
              review_score, positive_text, negative_text, checkin_date, checkout_date, lang, \
              photo_urls, raw_payload, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hotel_fk)
        .bind(&review.review_url)
        .bind(&review.username)
        .bind(&review.country_code)
        .bind(&review.country_name)
        .bind(&review.reviewed_date)
        .bind(review.review_score)
        .bind(&review.positive_text)
        .bind(&review.negative_text)
        .bind(&review.checkin_date)
        .bind(&review.checkout_date)
        .bind(&review.lang)
        .bind(photo_urls)
        .bind(raw_payload)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for ReviewRepository {
    async fn save_hotel_snapshot(
        &self,
        stats: &HotelStats,
        info: &HotelInfo,
    ) -> ScrapeResult<Hotel> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(ScrapeError::from)?;

        let existing = sqlx::query("SELECT id, created_at FROM hotels WHERE hotel_id = ?")
            .bind(info.identity.hotel_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ScrapeError::from)?;

        let total_reviews = stats.total_reviews();
        let (hotel_fk, created_at) = match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                let created_at = row.get("created_at");
                sqlx::query(
                    "UPDATE hotels SET ufi = ?, country_code = ?, name = ?, score = ?, \
                     city_name = ?, country_name = ?, page_url = ?, reviews_count = ?, \
                     updated_at = ? WHERE id = ?",
                )
                .bind(info.identity.ufi)
                .bind(&info.identity.country_code)
                .bind(&info.name)
                .bind(info.score)
                .bind(&info.city_name)
                .bind(&info.country_name)
                .bind(&info.page_url)
                .bind(total_reviews)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(ScrapeError::from)?;
                (id, created_at)
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO hotels \
                     (hotel_id, ufi, country_code, name, score, city_name, country_name, \
                      page_url, reviews_count, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(info.identity.hotel_id)
                .bind(info.identity.ufi)
                .bind(&info.identity.country_code)
                .bind(&info.name)
                .bind(info.score)
                .bind(&info.city_name)
                .bind(&info.country_name)
                .bind(&info.page_url)
                .bind(total_reviews)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(ScrapeError::from)?;
                (result.last_insert_rowid(), now)
            }
        };

        Self::insert_aggregates(&mut tx, stats, hotel_fk)
            .await
            .map_err(ScrapeError::from)?;

        tx.commit().await.map_err(ScrapeError::from)?;
        debug!(
            "Saved hotel snapshot for {} (row {hotel_fk}, {} aggregate buckets)",
            info.name,
            stats.customer_type_filter.len()
                + stats.language_filter.len()
                + stats.rating_scores.len()
                + stats.topic_filters.len()
        );

        Ok(Hotel {
            id: hotel_fk,
            hotel_id: info.identity.hotel_id,
            name: info.name.clone(),
            country_code: info.identity.country_code.clone(),
            country_name: info.country_name.clone(),
            city_name: info.city_name.clone(),
            ufi: info.identity.ufi,
            total_reviews,
            average_score: info.score,
            created_at,
            updated_at: now,
        })
    }

    async fn save_reviews(
        &self,
        reviews: &[ReviewRecord],
        hotel: &Hotel,
    ) -> ScrapeResult<(u64, u64)> {
        let mut added = 0u64;
        let mut skipped = 0u64;

        for chunk in reviews.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await.map_err(ScrapeError::from)?;
            let mut chunk_added: Vec<&ReviewRecord> = Vec::new();

            for review in chunk {
                let exists = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM reviews WHERE review_url = ?",
                )
                .bind(&review.review_url)
                .fetch_one(&mut *tx)
                .await
                .map_err(ScrapeError::from)?;

                if exists > 0 {
                    skipped += 1;
                    continue;
                }

                match Self::insert_review(&mut tx, review, hotel.id).await {
                    Ok(()) => {
                        added += 1;
                        chunk_added.push(review);
                    }
                    // Lost a race with another writer on the same URL.
                    Err(err) if is_unique_violation(&err) => skipped += 1,
                    Err(err) => {
                        if let Err(rollback_err) = tx.rollback().await {
                            warn!("Rollback failed: {rollback_err}");
                        }
                        return Err(ScrapeError::Storage(format!(
                            "failed to insert review {}: {err}",
                            review.review_url
                        )));
                    }
                }
            }

            tx.commit().await.map_err(ScrapeError::from)?;

            if let Some(downloader) = &self.photo_downloader {
                for review in chunk_added {
                    downloader
                        .download_review_photos(&hotel.name, &review.review_url, &review.photo_urls)
                        .await;
                }
            }
        }

        info!(
            "Saved reviews for {}: {added} added, {skipped} already present",
            hotel.name
        );
        Ok((added, skipped))
    }
}

/// Bucket names arrive with their count baked in ("Families (120)"); only
/// the label part is stored.
fn clean_bucket_name(name: &str) -> String {
    match name.split_once(" (") {
        Some((label, _)) => label.trim().to_string(),
        None => name.trim().to_string(),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{FilterBucket, HotelIdentity, LanguageBucket};
    use crate::infrastructure::config::StorageConfig;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn test_repository() -> (tempfile::TempDir, ReviewRepository) {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: tmp.path().join("test.db"),
            ..Default::default()
        };
        let db = DatabaseConnection::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        (tmp, ReviewRepository::new(db.pool(), 50))
    }

    fn sample_info() -> HotelInfo {
        HotelInfo {
            identity: HotelIdentity {
                hotel_id: 1377059,
                ufi: 900040497,
                country_code: "eg".into(),
            },
            name: "Golden Oasis".into(),
            score: 8.4,
            city_name: "Giza".into(),
            country_name: "Egypt".into(),
            page_url: "https://www.booking.com/hotel/eg/golden-oasis.html".into(),
        }
    }

    fn sample_stats(total: i64) -> HotelStats {
        HotelStats {
            reviews_count: total,
            customer_type_filter: vec![FilterBucket {
                name: format!("All travelers ({total})"),
                value: "ALL".into(),
                count: total,
            }],
            language_filter: vec![LanguageBucket {
                name: "English (200)".into(),
                value: "en".into(),
                count: 200,
                country_flag: Some("gb".into()),
            }],
            ..Default::default()
        }
    }

    fn sample_review(url: &str) -> ReviewRecord {
        ReviewRecord {
            review_url: url.to_string(),
            username: Some("sam".into()),
            review_score: Some(9.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn snapshot_is_upserted_not_duplicated() {
        let (_tmp, repo) = test_repository().await;
        let info = sample_info();

        let first = repo.save_hotel_snapshot(&sample_stats(100), &info).await.unwrap();
        let second = repo.save_hotel_snapshot(&sample_stats(150), &info).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.total_reviews, 150);

        let hotel_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hotels")
            .fetch_one(&*repo.pool)
            .await
            .unwrap();
        assert_eq!(hotel_rows, 1);
    }

    #[tokio::test]
    async fn aggregates_are_replaced_not_accumulated() {
        let (_tmp, repo) = test_repository().await;
        let info = sample_info();

        repo.save_hotel_snapshot(&sample_stats(100), &info).await.unwrap();
        repo.save_hotel_snapshot(&sample_stats(150), &info).await.unwrap();

        let bucket_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_type_filters")
            .fetch_one(&*repo.pool)
            .await
            .unwrap();
        assert_eq!(bucket_rows, 1);

        let name: String = sqlx::query_scalar("SELECT name FROM customer_type_filters")
            .fetch_one(&*repo.pool)
            .await
            .unwrap();
        assert_eq!(name, "All travelers");
    }

    #[tokio::test]
    async fn save_reviews_dedups_by_url() {
        let (_tmp, repo) = test_repository().await;
        let hotel = repo
            .save_hotel_snapshot(&sample_stats(10), &sample_info())
            .await
            .unwrap();

        let first_batch = vec![sample_review("/r/1"), sample_review("/r/2")];
        assert_eq!(repo.save_reviews(&first_batch, &hotel).await.unwrap(), (2, 0));

        let second_batch = vec![sample_review("/r/2"), sample_review("/r/3")];
        assert_eq!(repo.save_reviews(&second_batch, &hotel).await.unwrap(), (1, 1));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
            .fetch_one(&*repo.pool)
            .await
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn save_reviews_is_idempotent() {
        let (_tmp, repo) = test_repository().await;
        let hotel = repo
            .save_hotel_snapshot(&sample_stats(10), &sample_info())
            .await
            .unwrap();

        let batch = vec![sample_review("/r/1")];
        repo.save_reviews(&batch, &hotel).await.unwrap();
        assert_eq!(repo.save_reviews(&batch, &hotel).await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn racing_insert_is_classified_as_a_unique_violation() {
        let (_tmp, repo) = test_repository().await;
        let hotel = repo
            .save_hotel_snapshot(&sample_stats(10), &sample_info())
            .await
            .unwrap();

        // Two inserts of the same URL: the second hits the reviews.review_url
        // constraint directly, as a concurrent writer would between the
        // existence check and the insert.
        let mut tx = repo.pool.begin().await.unwrap();
        ReviewRepository::insert_review(&mut tx, &sample_review("/r/race"), hotel.id)
            .await
            .unwrap();
        let err = ReviewRepository::insert_review(&mut tx, &sample_review("/r/race"), hotel.id)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
        tx.rollback().await.unwrap();

        // And the save path reports such a duplicate as skipped, not fatal.
        let batch = vec![sample_review("/r/race"), sample_review("/r/race")];
        let (added, skipped) = repo.save_reviews(&batch, &hotel).await.unwrap();
        assert_eq!((added, skipped), (1, 1));
    }

    #[test]
    fn bucket_names_lose_their_count_suffix() {
        assert_eq!(clean_bucket_name("Families (120)"), "Families");
        assert_eq!(clean_bucket_name("Solo travelers"), "Solo travelers");
    }
}
