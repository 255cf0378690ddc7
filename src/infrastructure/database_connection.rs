//! SQLite connection pool and schema management

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::infrastructure::config::StorageConfig;

/// Database connection manager backed by a shared SQLite pool.
pub struct DatabaseConnection {
    pool: Arc<SqlitePool>,
}

impl DatabaseConnection {
    /// Open (creating the file and parent directory if needed) and configure
    /// the pool.
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
        ensure_database_file(&config.database_path)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.database_url())
            .await
            .with_context(|| format!("failed to connect to {}", config.database_url()))?;

        // WAL keeps readers unblocked while review batches commit.
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        info!("Connected to database at {}", config.database_path.display());
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> Arc<SqlitePool> {
        Arc::clone(&self.pool)
    }

    /// Create the schema if it does not exist yet. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hotels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hotel_id INTEGER NOT NULL,
                ufi INTEGER NOT NULL,
                country_code TEXT NOT NULL,
                name TEXT NOT NULL,
                score REAL NOT NULL DEFAULT 0,
                city_name TEXT NOT NULL,
                country_name TEXT NOT NULL,
                page_url TEXT NOT NULL,
                reviews_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(hotel_id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("failed to create hotels table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hotel_fk INTEGER NOT NULL REFERENCES hotels(id),
                review_url TEXT NOT NULL UNIQUE,
                username TEXT,
                country_code TEXT,
                country_name TEXT,
                reviewed_date TEXT,
                review_score REAL,
                positive_text TEXT,
                negative_text TEXT,
                checkin_date TEXT,
                checkout_date TEXT,
                lang TEXT,
                photo_urls TEXT,
                raw_payload TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("failed to create reviews table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS customer_type_filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hotel_fk INTEGER NOT NULL REFERENCES hotels(id),
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("failed to create customer_type_filters table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS language_filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hotel_fk INTEGER NOT NULL REFERENCES hotels(id),
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                country_flag TEXT
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("failed to create language_filters table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rating_scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hotel_fk INTEGER NOT NULL REFERENCES hotels(id),
                name TEXT NOT NULL,
                translation TEXT NOT NULL,
                value REAL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("failed to create rating_scores table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topic_filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hotel_fk INTEGER NOT NULL REFERENCES hotels(id),
                topic_id INTEGER,
                name TEXT NOT NULL,
                translation_id TEXT,
                translation_name TEXT,
                is_selected INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("failed to create topic_filters table")?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_reviews_hotel ON reviews(hotel_fk)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_url ON reviews(review_url)",
            "CREATE INDEX IF NOT EXISTS idx_customer_type_hotel ON customer_type_filters(hotel_fk)",
            "CREATE INDEX IF NOT EXISTS idx_language_hotel ON language_filters(hotel_fk)",
            "CREATE INDEX IF NOT EXISTS idx_rating_hotel ON rating_scores(hotel_fk)",
            "CREATE INDEX IF NOT EXISTS idx_topic_hotel ON topic_filters(hotel_fk)",
        ] {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .context("failed to create index")?;
        }

        info!("Database schema is up to date");
        Ok(())
    }
}

fn ensure_database_file(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::File::create(path)
            .with_context(|| format!("failed to create database file {}", path.display()))?;
    }
    Ok(())
}
