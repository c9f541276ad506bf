//! SQLite durable tier.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::task::JoinHandle;

use super::{KeyValueStore, StorageError, StoredRecord};

const TIER: &str = "sqlite";

/// Durable key-value store on a single SQLite table.
///
/// Expiry timestamps are stored as epoch milliseconds. Expired rows are
/// filtered on read and removed by [`SqliteStore::purge_expired`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url`, e.g.
    /// `sqlite://sessions.db`, and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Unavailable {
                tier: TIER,
                message: e.to_string(),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable {
                tier: TIER,
                message: e.to_string(),
            })?;

        Self::from_pool(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// The pool is pinned to one connection that never recycles, since each
    /// SQLite in-memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the database cannot be opened.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::Unavailable {
                tier: TIER,
                message: e.to_string(),
            })?;

        Self::from_pool(pool).await
    }

    /// Uses an existing pool, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS kv_records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                expire_at INTEGER
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend(TIER, format!("Failed to create kv_records: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_records_expire_at ON kv_records (expire_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StorageError::backend(TIER, format!("Failed to create expiry index: {e}"))
            })?;

        Ok(())
    }

    async fn upsert(
        &self,
        key: &str,
        value: String,
        expire_at: Option<i64>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO kv_records (key, value, updated_at, expire_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                expire_at = excluded.expire_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(now_millis())
        .bind(expire_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend(TIER, format!("Failed to write record: {e}")))?;

        Ok(())
    }

    /// Deletes every expired row and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM kv_records WHERE expire_at IS NOT NULL AND expire_at <= $1",
        )
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend(TIER, format!("Failed to purge records: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Starts a background task that purges expired rows every `interval`.
    #[must_use]
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Purged expired session rows"),
                    Err(e) => tracing::warn!(error = %e, "Failed to purge expired session rows"),
                }
            }
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>, StorageError> {
        let row = sqlx::query("SELECT value, expire_at FROM kv_records WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::backend(TIER, format!("Failed to read record: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: String = row.get("value");
        let expire_at: Option<i64> = row.get("expire_at");

        let ttl_seconds = match expire_at {
            None => None,
            Some(at) => {
                let remaining = at - now_millis();
                if remaining <= 0 {
                    return Ok(None);
                }
                Some(remaining.unsigned_abs().div_ceil(1000))
            }
        };

        Ok(Some(StoredRecord {
            key: key.to_string(),
            value,
            ttl_seconds,
        }))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.upsert(key, value, None).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        ttl_seconds: u64,
        value: String,
    ) -> Result<(), StorageError> {
        if ttl_seconds == 0 {
            return self.delete(key).await;
        }
        let ttl_millis = i64::try_from(ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        let expire_at = now_millis().saturating_add(ttl_millis);
        self.upsert(key, value, Some(expire_at)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_records WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::backend(TIER, format!("Failed to delete record: {e}")))?;
        Ok(())
    }
}
