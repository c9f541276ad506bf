//! Error types for the extension runtime.
//!
//! This module contains the configuration error type and the top-level
//! [`ExtensionError`] that unifies the per-module error enums at the HTTP
//! boundary.
//!
//! # Error Handling
//!
//! Each module reports failures through its own enum ([`ConfigError`],
//! [`StorageError`], [`HttpError`], [`OAuthError`], [`WebhookError`]).
//! Handlers in the embedding web application convert them into
//! [`ExtensionError`] and render [`ExtensionError::envelope`] with
//! [`ExtensionError::status_code`].
//!
//! # Example
//!
//! ```rust
//! use fp_extension::error::ExtensionError;
//! use fp_extension::auth::oauth::OAuthError;
//!
//! let error: ExtensionError = OAuthError::invalid_company_id().into();
//! assert_eq!(error.status_code(), 400);
//!
//! let json = serde_json::to_string(&error.envelope()).unwrap();
//! assert_eq!(json, r#"{"success":false,"error":"Invalid company id"}"#);
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::auth::oauth::OAuthError;
use crate::clients::HttpError;
use crate::storage::StorageError;
use crate::webhooks::WebhookError;

/// Errors that can occur while configuring the extension.
///
/// Each variant provides a clear, actionable error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// API key cannot be empty.
    #[error("API key cannot be empty. Please provide the extension API key.")]
    EmptyApiKey,

    /// API secret cannot be empty.
    #[error("API secret cannot be empty. Please provide the extension API secret.")]
    EmptyApiSecret,

    /// A URL is invalid.
    #[error("Invalid URL '{url}'. Please provide a valid URL with scheme (e.g., 'https://extension.example.com').")]
    InvalidUrl {
        /// The invalid URL that was provided.
        url: String,
    },

    /// A scope entry is invalid.
    #[error("Invalid scopes: {reason}")]
    InvalidScopes {
        /// The reason the scopes are invalid.
        reason: String,
    },

    /// Access mode string is not `online` or `offline`.
    #[error("Invalid access mode '{mode}'. Expected 'online' or 'offline'.")]
    InvalidAccessMode {
        /// The invalid mode that was provided.
        mode: String,
    },

    /// A required field is missing.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },
}

/// Unified error for the extension's request entry points.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Install/authorize flow failure.
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// Webhook verification, dispatch or sync failure.
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// A storage tier failed on a write path.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Platform API transport failure.
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl ExtensionError {
    /// HTTP status code to answer with.
    ///
    /// `400` for missing identifiers, `401` for an unknown session or a bad
    /// webhook signature, `500` for everything else.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::OAuth(OAuthError::InvalidInput { .. }) => 400,
            Self::OAuth(OAuthError::SessionNotFound { .. })
            | Self::Webhook(WebhookError::InvalidSignature) => 401,
            _ => 500,
        }
    }

    /// Builds the `{success: false, error}` response body.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.to_string())
    }
}

/// JSON error body returned by install, authorize and webhook endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    /// Always `false`.
    pub success: bool,
    /// Human readable error message.
    pub error: String,
}

impl ErrorEnvelope {
    /// Creates a failure envelope with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}
