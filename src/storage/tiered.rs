//! Cache-over-durable composition.

use std::sync::Arc;

use async_trait::async_trait;

use super::{KeyValueStore, StorageError, StoredRecord};

/// A cache tier layered over a durable tier.
///
/// Reads try the cache first and fall back to the durable tier, copying a
/// durable hit back into the cache with the durable record's remaining TTL.
/// A read failure in either tier is logged and treated as a miss.
///
/// Writes and deletes hit the durable tier first, then the cache. If the
/// cache write fails after the durable write succeeded, the error is still
/// returned; the next read backfills the cache from the durable copy.
#[derive(Clone)]
pub struct TieredStore {
    cache: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore").finish_non_exhaustive()
    }
}

impl TieredStore {
    /// Composes `cache` over `durable`.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueStore>, durable: Arc<dyn KeyValueStore>) -> Self {
        Self { cache, durable }
    }

    /// Returns the cache tier.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn KeyValueStore> {
        &self.cache
    }

    /// Returns the durable tier.
    #[must_use]
    pub fn durable(&self) -> &Arc<dyn KeyValueStore> {
        &self.durable
    }

    async fn backfill(&self, key: &str, record: &StoredRecord) {
        let result = match record.ttl_seconds {
            Some(ttl) => {
                self.cache
                    .set_with_ttl(key, ttl, record.value.clone())
                    .await
            }
            None => self.cache.set(key, record.value.clone()).await,
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Failed to backfill cache tier");
        }
    }
}

#[async_trait]
impl KeyValueStore for TieredStore {
    async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>, StorageError> {
        match self.cache.get_record(key).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "Cache tier read failed"),
        }

        match self.durable.get_record(key).await {
            Ok(Some(record)) => {
                self.backfill(key, &record).await;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(key, error = %e, "Durable tier read failed");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.durable.set(key, value.clone()).await?;
        self.cache.set(key, value).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        ttl_seconds: u64,
        value: String,
    ) -> Result<(), StorageError> {
        self.durable
            .set_with_ttl(key, ttl_seconds, value.clone())
            .await?;
        self.cache.set_with_ttl(key, ttl_seconds, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.durable.delete(key).await?;
        self.cache.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Store that can be switched into failing mode and records call order.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FlakyStore {
        fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                inner: MemoryStore::new(),
                failing: AtomicBool::new(false),
                name,
                log,
            }
        }

        fn check(&self, op: &str) -> Result<(), StorageError> {
            self.log.lock().unwrap().push(format!("{}:{op}", self.name));
            if self.failing.load(Ordering::SeqCst) {
                Err(StorageError::backend(self.name, "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>, StorageError> {
            self.check("get")?;
            self.inner.get_record(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
            self.check("set")?;
            self.inner.set(key, value).await
        }

        async fn set_with_ttl(
            &self,
            key: &str,
            ttl_seconds: u64,
            value: String,
        ) -> Result<(), StorageError> {
            self.check("set_with_ttl")?;
            self.inner.set_with_ttl(key, ttl_seconds, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.check("delete")?;
            self.inner.delete(key).await
        }
    }

    fn tiers() -> (Arc<FlakyStore>, Arc<FlakyStore>, TieredStore, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cache = Arc::new(FlakyStore::new("cache", Arc::clone(&log)));
        let durable = Arc::new(FlakyStore::new("durable", Arc::clone(&log)));
        let store = TieredStore::new(cache.clone(), durable.clone());
        (cache, durable, store, log)
    }

    #[tokio::test]
    async fn test_writes_go_to_durable_then_cache() {
        let (_, _, store, log) = tiers();
        store.set_with_ttl("k", 30, "v".to_string()).await.unwrap();
        store.delete("k").await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            [
                "durable:set_with_ttl",
                "cache:set_with_ttl",
                "durable:delete",
                "cache:delete"
            ]
        );
    }

    #[tokio::test]
    async fn test_durable_write_failure_skips_cache() {
        let (cache, durable, store, _) = tiers();
        durable.failing.store(true, Ordering::SeqCst);

        let result = store.set("k", "v".to_string()).await;
        assert!(matches!(
            result,
            Err(StorageError::Backend { tier: "durable", .. })
        ));
        assert!(cache.inner.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_failure_falls_back_to_durable() {
        let (cache, durable, store, _) = tiers();
        durable.inner.set("k", "v".to_string()).await.unwrap();
        cache.failing.store(true, Ordering::SeqCst);

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_durable_read_failure_is_a_miss() {
        let (cache, durable, store, _) = tiers();
        cache.failing.store(true, Ordering::SeqCst);
        durable.failing.store(true, Ordering::SeqCst);

        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backfill_keeps_remaining_ttl() {
        let (cache, durable, store, _) = tiers();
        durable
            .inner
            .set_with_ttl("k", 10, "v".to_string())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        let cached = cache.inner.get_record("k").await.unwrap().unwrap();
        assert_eq!(cached.ttl_seconds, Some(6));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(cache.inner.get("k").await.unwrap().is_none());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backfill_of_persistent_record() {
        let (cache, durable, store, _) = tiers();
        durable.inner.set("k", "v".to_string()).await.unwrap();

        store.get("k").await.unwrap();
        assert_eq!(
            cache.inner.get_record("k").await.unwrap(),
            Some(StoredRecord::persistent("k", "v"))
        );

        durable.failing.store(true, Ordering::SeqCst);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_huge_ttl_is_written_to_both_tiers() {
        let (cache, durable, store, _) = tiers();
        store.set_with_ttl("k", u64::MAX, "v".to_string()).await.unwrap();

        assert_eq!(cache.inner.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(durable.inner.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_delete_removes_both_tiers() {
        let (cache, durable, store, _) = tiers();
        store.set("k", "v".to_string()).await.unwrap();
        store.delete("k").await.unwrap();

        assert!(cache.inner.get("k").await.unwrap().is_none());
        assert!(durable.inner.get("k").await.unwrap().is_none());
    }
}
