//! SQLite storage backend - the structured store (Backend A).
//!
//! Features:
//! - WAL mode for concurrent readers
//! - Single-statement upserts, so each write is atomic
//! - No practical payload ceiling (TEXT columns)

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::backend::{validate_key, StorageBackend};
use crate::config::StructuredConfig;
use crate::error::{Result, StorageError};

/// SQLite implementation of StorageBackend.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open or create a SQLite store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_file(path.as_ref(), 5, Duration::from_secs(30)).await
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // The database lives as long as its single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Open the store described by `config`.
    pub async fn from_config(config: &StructuredConfig) -> Result<Self> {
        match &config.path {
            Some(path) => {
                Self::connect_file(path, config.max_connections, config.busy_timeout()).await
            }
            None => Self::in_memory().await,
        }
    }

    async fn connect_file(
        path: &Path,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self> {
        info!("Opening SQLite store at {:?}", path);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let backend = Self { pool };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Number of stored keys.
    pub async fn len(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Close the pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get current Unix timestamp in milliseconds.
    fn now_unix_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now_unix_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_store")
            .execute(&self.pool)
            .await?;

        debug!("SQLite store cleared");
        Ok(())
    }
}
