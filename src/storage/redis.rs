//! Redis cache tier.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{KeyValueStore, StorageError, StoredRecord};

const TIER: &str = "redis";

/// Key-value store on Redis.
///
/// Expiry is delegated to Redis (`SET EX`). Keys are namespaced with an
/// optional prefix so several extensions can share one instance.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the Redis instance at `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url).map_err(|e| StorageError::Unavailable {
            tier: TIER,
            message: e.to_string(),
        })?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| StorageError::Unavailable {
                tier: TIER,
                message: e.to_string(),
            })?;
        tracing::info!("Connected to Redis session cache");
        Ok(Self::from_connection(connection))
    }

    /// Wraps an existing connection manager.
    #[must_use]
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            prefix: String::new(),
        }
    }

    /// Prepends `prefix` to every key.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>, StorageError> {
        let namespaced = self.namespaced(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(&namespaced)
            .await
            .map_err(|e| StorageError::backend(TIER, e))?;
        let Some(value) = value else {
            return Ok(None);
        };

        // -1: no expiry, -2: key vanished between the two calls
        let ttl: i64 = conn
            .ttl(&namespaced)
            .await
            .map_err(|e| StorageError::backend(TIER, e))?;
        let ttl_seconds = match ttl {
            -2 => return Ok(None),
            t if t < 0 => None,
            t => Some(t.unsigned_abs()),
        };

        Ok(Some(StoredRecord {
            key: key.to_string(),
            value,
            ttl_seconds,
        }))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(self.namespaced(key), value)
            .await
            .map_err(|e| StorageError::backend(TIER, e))
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
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(self.namespaced(key), value, ttl_seconds)
            .await
            .map_err(|e| StorageError::backend(TIER, e))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.namespaced(key))
            .await
            .map_err(|e| StorageError::backend(TIER, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisStore::connect("not a redis url").await;
        assert!(matches!(
            result,
            Err(StorageError::Unavailable { tier: "redis", .. })
        ));
    }
}
