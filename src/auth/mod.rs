//! Authentication types for platform extensions.
//!
//! This module provides sessions, their identifiers and the registry that
//! persists them, plus the OAuth install flow in [`oauth`].
//!
//! # Overview
//!
//! - [`Session`]: a persisted grant for one tenant
//! - [`AccessToken`]: the token endpoint's response
//! - [`SessionRegistry`]: save, load and delete sessions over a [`KeyValueStore`](crate::storage::KeyValueStore)
//! - [`new_online_id`] / [`new_offline_id`]: session identifiers
//! - [`oauth`]: install, authorize, uninstall and auto-install
//!
//! # Session Types
//!
//! - **Online sessions**: created per install with a random id, tied to the
//!   browser that started it, and short-lived.
//! - **Offline sessions**: one per tenant and cluster with a deterministic id,
//!   usable from background jobs and webhooks.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::auth::{new_offline_id, AccessMode, Session};
//!
//! let id = new_offline_id("https://api.fynd.com", "T1");
//! let mut session = Session::new(id, "T1", "ext-api-key");
//! session.access_mode = AccessMode::Offline;
//!
//! let json = serde_json::to_string(&session).unwrap();
//! let restored: Session = serde_json::from_str(&json).unwrap();
//! assert_eq!(restored.company_id, "T1");
//! assert!(!restored.is_new);
//! ```

mod identity;
pub mod oauth;
mod registry;
pub mod session;

pub use identity::{new_offline_id, new_online_id};
pub use registry::SessionRegistry;
pub use session::{AccessMode, AccessToken, Session};
