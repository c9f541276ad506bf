//! Session persistence on top of a [`KeyValueStore`].

use std::sync::Arc;

use chrono::Utc;

use crate::auth::identity::new_offline_id;
use crate::auth::Session;
use crate::storage::{KeyValueStore, StorageError};

/// Saves, loads and deletes [`Session`]s through a [`KeyValueStore`].
///
/// The registry is the only writer of session records. Sessions are stored
/// as JSON under their id.
///
/// # Concurrency
///
/// Two concurrent [`save`](Self::save) calls for the same id race in the
/// store and the last write wins. There is no compare-and-swap; callers that
/// read, modify and write a session back must tolerate a lost update.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use fp_extension::auth::SessionRegistry;
/// use fp_extension::storage::MemoryStore;
/// use fp_extension::Session;
///
/// # tokio_test::block_on(async {
/// let registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
/// let session = Session::new("abc", "T1", "ext");
///
/// registry.save(&session).await.unwrap();
/// let loaded = registry.get("abc").await.unwrap();
/// assert_eq!(loaded.company_id, "T1");
/// # });
/// ```
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates a registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persists `session` under its id.
    ///
    /// A session with `expires` set is written with the remaining lifetime
    /// as TTL; one whose expiry has already passed is removed instead of
    /// written. Sessions without `expires` never expire.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if serialization or the store write fails.
    pub async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let value = serde_json::to_string(session)
            .map_err(|e| StorageError::backend("session", e))?;

        match session.ttl_seconds(Utc::now()) {
            Some(0) => {
                tracing::debug!(session_id = %session.id, "Session already expired, removing");
                self.store.delete(&session.id).await
            }
            Some(ttl) => self.store.set_with_ttl(&session.id, ttl, value).await,
            None => self.store.set(&session.id, value).await,
        }
    }

    /// Loads the session stored under `session_id`.
    ///
    /// Returns `None` when the record is absent, unreadable or expired.
    /// Read failures and corrupt payloads are logged, not returned.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let raw = match self.store.get(session_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Failed to read session");
                return None;
            }
        };

        let mut session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Discarding corrupt session payload");
                return None;
            }
        };

        if session.expired() {
            tracing::debug!(session_id, "Ignoring expired session");
            return None;
        }

        session.id = session_id.to_string();
        Some(session)
    }

    /// Loads the canonical offline session of `company_id` on `cluster`.
    pub async fn get_by_tenant(&self, company_id: &str, cluster: &str) -> Option<Session> {
        self.get(&new_offline_id(cluster, company_id)).await
    }

    /// Removes the session stored under `session_id`. Absent ids are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store delete fails.
    pub async fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        self.store.delete(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessMode, AccessToken};
    use crate::storage::MemoryStore;
    use chrono::Duration;

    fn registry() -> (MemoryStore, SessionRegistry) {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(Arc::new(store.clone()));
        (store, registry)
    }

    fn populated_session() -> Session {
        let mut session = Session::new("sid", "T1", "ext");
        session.scope = vec!["company/orders".to_string(), "company/products".to_string()];
        session.state = Some("nonce".to_string());
        session.expires = Some(Utc::now() + Duration::minutes(10));
        session.update_token(&AccessToken {
            access_token: "tok".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_in: Some(600),
            scope: Vec::new(),
            access_mode: Some(AccessMode::Online),
            current_user: None,
        });
        session
    }

    #[tokio::test]
    async fn test_save_then_get_round_trips_persisted_fields() {
        let (_, registry) = registry();
        let session = populated_session();

        registry.save(&session).await.unwrap();
        let loaded = registry.get("sid").await.unwrap();

        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_get_returns_independent_copies() {
        let (_, registry) = registry();
        registry.save(&populated_session()).await.unwrap();

        let mut first = registry.get("sid").await.unwrap();
        first.access_token = Some("tampered".to_string());

        let second = registry.get("sid").await.unwrap();
        assert_eq!(second.access_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_save_writes_remaining_ttl() {
        let (store, registry) = registry();
        registry.save(&populated_session()).await.unwrap();

        let record = store.get_record("sid").await.unwrap().unwrap();
        let ttl = record.ttl_seconds.unwrap();
        assert!((599..=600).contains(&ttl), "ttl was {ttl}");
    }

    #[tokio::test]
    async fn test_save_without_expiry_has_no_ttl() {
        let (store, registry) = registry();
        registry.save(&Session::new("sid", "T1", "ext")).await.unwrap();

        let record = store.get_record("sid").await.unwrap().unwrap();
        assert_eq!(record.ttl_seconds, None);
    }

    #[tokio::test]
    async fn test_save_of_expired_session_removes_it() {
        let (store, registry) = registry();
        registry.save(&populated_session()).await.unwrap();

        let mut expired = populated_session();
        expired.expires = Some(Utc::now() - Duration::seconds(5));
        registry.save(&expired).await.unwrap();

        assert!(store.get("sid").await.unwrap().is_none());
        assert!(registry.get("sid").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_not_found() {
        let (store, registry) = registry();
        store.set("sid", "{not json".to_string()).await.unwrap();

        assert!(registry.get("sid").await.is_none());
    }

    #[tokio::test]
    async fn test_get_rekeys_with_requested_id() {
        let (store, registry) = registry();
        let stored = serde_json::to_string(&Session::new("other", "T1", "ext")).unwrap();
        store.set("sid", stored).await.unwrap();

        assert_eq!(registry.get("sid").await.unwrap().id, "sid");
    }

    #[tokio::test]
    async fn test_get_by_tenant_uses_offline_id() {
        let (_, registry) = registry();
        let id = new_offline_id("https://api.fynd.com", "T1");
        registry.save(&Session::new(id, "T1", "ext")).await.unwrap();

        let session = registry
            .get_by_tenant("T1", "https://api.fynd.com")
            .await
            .unwrap();
        assert_eq!(session.company_id, "T1");
        assert!(registry
            .get_by_tenant("T2", "https://api.fynd.com")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, registry) = registry();
        registry.save(&populated_session()).await.unwrap();

        registry.delete("sid").await.unwrap();
        registry.delete("sid").await.unwrap();
        assert!(registry.get("sid").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_saves_last_writer_wins() {
        let (_, registry) = registry();
        let mut first = Session::new("sid", "T1", "ext");
        first.state = Some("first".to_string());
        let mut second = first.clone();
        second.state = Some("second".to_string());

        registry.save(&first).await.unwrap();
        registry.save(&second).await.unwrap();

        let loaded = registry.get("sid").await.unwrap();
        assert_eq!(loaded.state.as_deref(), Some("second"));
    }
}
