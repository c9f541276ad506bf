//! Key-value storage for session records.
//!
//! Sessions are persisted through the [`KeyValueStore`] trait. Four
//! implementations are provided:
//!
//! - [`MemoryStore`]: process-local map with lazy expiry, used as cache tier and in tests
//! - [`RedisStore`]: Redis-backed cache tier
//! - [`SqliteStore`]: durable tier on SQLite
//! - [`TieredStore`]: composes a cache tier over a durable tier
//!
//! # TTL semantics
//!
//! A TTL is a whole number of seconds. Records written with a TTL must not
//! be returned once it has elapsed. A TTL of `0` means the record is already
//! expired, so [`KeyValueStore::set_with_ttl`] with `0` removes the key.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::storage::{KeyValueStore, MemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.set_with_ttl("session:abc", 60, "{}".to_string()).await.unwrap();
//! assert_eq!(store.get("session:abc").await.unwrap().as_deref(), Some("{}"));
//! # });
//! ```

mod memory;
mod redis;
mod sqlite;
mod tiered;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::sqlite::SqliteStore;
pub use self::tiered::TieredStore;

/// Errors raised by a storage tier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend rejected or failed the operation.
    #[error("{tier} storage error: {message}")]
    Backend {
        /// Which tier failed (`memory`, `redis`, `sqlite`, `cache`, `durable`).
        tier: &'static str,
        /// Backend error message.
        message: String,
    },

    /// The backend could not be reached or initialized.
    #[error("{tier} storage unavailable: {message}")]
    Unavailable {
        /// Which tier failed.
        tier: &'static str,
        /// Connection error message.
        message: String,
    },
}

impl StorageError {
    /// Creates a [`StorageError::Backend`] from any displayable error.
    pub fn backend(tier: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Backend {
            tier,
            message: error.to_string(),
        }
    }

    /// Returns the tier that produced the error.
    #[must_use]
    pub const fn tier(&self) -> &'static str {
        match self {
            Self::Backend { tier, .. } | Self::Unavailable { tier, .. } => *tier,
        }
    }
}

/// A stored value together with its remaining lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    /// The key the record is stored under.
    pub key: String,
    /// The raw stored value.
    pub value: String,
    /// Seconds until expiry, `None` for records without a TTL.
    pub ttl_seconds: Option<u64>,
}

impl StoredRecord {
    /// Creates a record without expiry.
    #[must_use]
    pub fn persistent(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl_seconds: None,
        }
    }
}

/// Async key-value store with optional per-key TTL.
///
/// Implementations must be shareable across tasks; the registry holds them
/// as `Arc<dyn KeyValueStore>`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the record stored under `key` with its remaining TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>, StorageError>;

    /// Stores `value` under `key` without expiry, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Stores `value` under `key`, expiring after `ttl_seconds`.
    ///
    /// A TTL of `0` deletes the key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn set_with_ttl(
        &self,
        key: &str,
        ttl_seconds: u64,
        value: String,
    ) -> Result<(), StorageError>;

    /// Removes `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_record(key).await?.map(|record| record.value))
    }
}

/// Rounds a remaining duration up to whole seconds, so a live record never
/// reports a TTL of `0`.
pub(crate) fn ceil_seconds(remaining: std::time::Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
