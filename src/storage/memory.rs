//! In-process key-value store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{ceil_seconds, KeyValueStore, StorageError, StoredRecord};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local store backed by a `HashMap` behind a tokio `RwLock`.
///
/// Expiry is checked on read; [`MemoryStore::purge_expired`] and
/// [`MemoryStore::spawn_sweeper`] reclaim memory for keys nobody reads.
/// Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Starts a background task that purges expired entries every `interval`.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired in-memory records");
                }
            }
        })
    }

    /// Returns the number of entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>, StorageError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            return Ok(None);
        }
        Ok(Some(StoredRecord {
            key: key.to_string(),
            value: entry.value.clone(),
            ttl_seconds: entry.expires_at.map(|at| ceil_seconds(at - now)),
        }))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
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
        // A TTL past the clock's range never expires.
        let expires_at = Instant::now().checked_add(Duration::from_secs(ttl_seconds));
        self.entries.write().await.insert(
            key.to_string(),
            Entry { value, expires_at },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string()).await.unwrap();

        let record = store.get_record("k").await.unwrap().unwrap();
        assert_eq!(record.value, "v");
        assert_eq!(record.ttl_seconds, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", 2, "v".to_string()).await.unwrap();

        tokio::time::advance(Duration::from_millis(1500)).await;
        let record = store.get_record("k").await.unwrap().unwrap();
        assert_eq!(record.ttl_seconds, Some(1));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_removes_key() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string()).await.unwrap();
        store.set_with_ttl("k", 0, "new".to_string()).await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ttl_beyond_clock_range_never_expires() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", u64::MAX, "v".to_string()).await.unwrap();

        let record = store.get_record("k").await.unwrap().unwrap();
        assert_eq!(record.value, "v");
        assert_eq!(record.ttl_seconds, None);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("missing").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_drops_only_expired_entries() {
        let store = MemoryStore::new();
        store.set_with_ttl("short", 1, "a".to_string()).await.unwrap();
        store.set_with_ttl("long", 100, "b".to_string()).await.unwrap();
        store.set("forever", "c".to_string()).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.set("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
