//! OAuth-specific error types.
//!
//! This module contains error types for the install, authorize, uninstall and
//! auto-install flows.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::auth::oauth::OAuthError;
//!
//! let error = OAuthError::invalid_company_id();
//! assert_eq!(error.to_string(), "Invalid company id");
//!
//! let error = OAuthError::InvalidOAuth;
//! assert_eq!(error.to_string(), "Invalid oauth call");
//! ```

use thiserror::Error;

use crate::clients::HttpError;
use crate::storage::StorageError;

/// Errors that can occur during the OAuth install flow.
///
/// # Thread Safety
///
/// `OAuthError` is `Send + Sync`, making it safe to use across async boundaries.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// A required identifier is missing from the request.
    #[error("{reason}")]
    InvalidInput {
        /// Message shown to the caller.
        reason: String,
    },

    /// The session named by the request cookie does not exist or has expired.
    #[error("Can not complete oauth process as session not found")]
    SessionNotFound {
        /// The session id that was looked up.
        session_id: String,
    },

    /// The state echoed by the redirect does not match the stored nonce.
    #[error("Invalid oauth call")]
    InvalidOAuth,

    /// The token endpoint answered with a non-success status.
    #[error("Token exchange failed with status {status}: {message}")]
    TokenExchangeFailed {
        /// The HTTP status code returned.
        status: u16,
        /// The error message from the response.
        message: String,
    },

    /// An extension callback failed.
    #[error("Extension callback failed: {message}")]
    Callback {
        /// The callback's error message.
        message: String,
    },

    /// Persisting or deleting a session failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Wrapped HTTP client error.
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl OAuthError {
    /// The error returned when neither `company_id` nor `organization_id` is present.
    #[must_use]
    pub fn invalid_company_id() -> Self {
        Self::InvalidInput {
            reason: "Invalid company id".to_string(),
        }
    }

    /// Wraps a callback failure.
    pub fn callback(error: impl std::fmt::Display) -> Self {
        Self::Callback {
            message: error.to_string(),
        }
    }
}

// Verify OAuthError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthError>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::HttpResponseError;

    #[test]
    fn test_invalid_company_id_message() {
        assert_eq!(
            OAuthError::invalid_company_id().to_string(),
            "Invalid company id"
        );
    }

    #[test]
    fn test_session_not_found_message() {
        let error = OAuthError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        assert!(error.to_string().contains("session not found"));
    }

    #[test]
    fn test_token_exchange_failed_includes_status_and_message() {
        let error = OAuthError::TokenExchangeFailed {
            status: 401,
            message: "invalid_grant".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("401"));
        assert!(message.contains("invalid_grant"));
    }

    #[test]
    fn test_from_http_error_conversion() {
        let http_error = HttpError::Response(HttpResponseError {
            code: 500,
            message: "Internal server error".to_string(),
            error_reference: None,
        });
        let error: OAuthError = http_error.into();
        assert!(matches!(error, OAuthError::Http(_)));
    }

    #[test]
    fn test_from_storage_error_conversion() {
        let error: OAuthError = StorageError::backend("durable", "down").into();
        assert!(matches!(error, OAuthError::Storage(_)));
        assert!(error.to_string().contains("down"));
    }

    #[test]
    fn test_callback_wraps_message() {
        let error = OAuthError::callback("webhook cleanup failed");
        assert_eq!(
            error.to_string(),
            "Extension callback failed: webhook cleanup failed"
        );
    }

    #[test]
    fn test_oauth_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OAuthError>();
    }
}
