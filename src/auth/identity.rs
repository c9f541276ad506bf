//! Session identifier generation.
//!
//! Online sessions get a fresh random id per install. Offline sessions are
//! keyed by `base64(SHA-256("{cluster}:{company_id}"))`, so every process
//! derives the same id for a tenant and repeated installs overwrite one record.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Returns a random identifier for an online session.
///
/// # Example
///
/// ```rust
/// use fp_extension::auth::new_online_id;
///
/// assert_ne!(new_online_id(), new_online_id());
/// ```
#[must_use]
pub fn new_online_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the canonical offline session id for a tenant on a cluster.
///
/// # Example
///
/// ```rust
/// use fp_extension::auth::new_offline_id;
///
/// let id = new_offline_id("https://api.fynd.com", "T1");
/// assert_eq!(id, new_offline_id("https://api.fynd.com", "T1"));
/// assert_ne!(id, new_offline_id("https://api.fynd.com", "T2"));
/// ```
#[must_use]
pub fn new_offline_id(cluster: &str, company_id: &str) -> String {
    let digest = Sha256::digest(format!("{cluster}:{company_id}").as_bytes());
    STANDARD.encode(digest)
}
