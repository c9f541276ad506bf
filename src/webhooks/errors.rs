//! Webhook-specific error types.
//!
//! - [`WebhookError::InvalidSignature`]: the `x-fp-signature` header did not match
//! - [`WebhookError::HandlerNotFound`]: no handler is mapped to the incoming event
//! - [`WebhookError::ProcessError`]: a handler failed
//! - [`WebhookError::RegistrationError`]: subscriber sync failed remotely
//! - [`WebhookError::InvalidConfig`]: the declared configuration is malformed
//!
//! # Example
//!
//! ```rust
//! use fp_extension::webhooks::WebhookError;
//!
//! let error = WebhookError::HandlerNotFound {
//!     event: "product/create".to_string(),
//! };
//! assert!(error.to_string().contains("product/create"));
//! ```

use thiserror::Error;

use crate::clients::HttpError;

/// Error type for webhook verification, dispatch and sync.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    ///
    /// The message is intentionally generic to avoid leaking security details.
    #[error("Signature passed does not match calculated body signature")]
    InvalidSignature,

    /// Subscriber sync against the platform failed.
    #[error("Failed to sync webhook subscriber: {message}")]
    RegistrationError {
        /// What went wrong.
        message: String,
    },

    /// A handler failed while processing an event.
    #[error("Failed to process webhook: {message}")]
    ProcessError {
        /// What went wrong.
        message: String,
    },

    /// No handler is mapped to the incoming event.
    #[error("Webhook handler not assigned for event: {event}")]
    HandlerNotFound {
        /// The `name/type` event key.
        event: String,
    },

    /// The declared webhook configuration is malformed.
    #[error("Invalid webhook config: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl WebhookError {
    /// Creates an [`InvalidConfig`](Self::InvalidConfig) error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl From<HttpError> for WebhookError {
    fn from(error: HttpError) -> Self {
        Self::RegistrationError {
            message: error.to_string(),
        }
    }
}
