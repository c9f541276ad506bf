//! Webhook configuration, verification, dispatch and subscriber sync.
//!
//! # Overview
//!
//! - [`WebhookConfig`]: the declared event map, endpoint path and scoping
//! - [`WebhookRegistry`]: named handlers plus inbound dispatch via [`WebhookRegistry::process`]
//! - [`verify_webhook`] / [`verify_signature`]: HMAC-SHA256 checks of inbound bodies
//! - [`WebhookSyncEngine`]: keeps the platform's subscriber record in line with the config
//! - [`WebhookError`]: error type for all of the above
//!
//! # Two Directions
//!
//! 1. **Outbound (sync)**: after an install, [`WebhookSyncEngine::sync_events`]
//!    creates the extension's subscriber or updates it when it drifted.
//! 2. **Inbound (process)**: each delivery is verified against the
//!    `x-fp-signature` header and dispatched by its `event.name/event.type`
//!    key. `ping` events always succeed.
//!
//! # Error Handling
//!
//! ```rust
//! use fp_extension::webhooks::WebhookError;
//!
//! fn status(error: &WebhookError) -> u16 {
//!     match error {
//!         WebhookError::InvalidSignature => 401,
//!         WebhookError::HandlerNotFound { .. } => 404,
//!         _ => 500,
//!     }
//! }
//!
//! assert_eq!(status(&WebhookError::InvalidSignature), 401);
//! ```

mod errors;
mod registry;
mod sync;
mod types;
mod verification;

pub use errors::WebhookError;
pub use registry::WebhookRegistry;
pub use sync::WebhookSyncEngine;
pub use types::{
    event_key, Association, AssociationCriteria, AuthMeta, BoxFuture, EventConfig,
    SalesChannelScope, SubscriberConfig, SubscriberStatus, SyncOutcome, WebhookConfig,
    WebhookConfigBuilder, WebhookHandler,
};
pub use verification::{
    verify_signature, verify_webhook, WebhookContext, WebhookRequest, HEADER_SIGNATURE,
    PING_EVENT,
};
