//! HTTP-specific error types.
//!
//! This module contains error types for HTTP operations against the
//! platform API, including response errors, retry exhaustion, request
//! validation failures and undecodable response bodies.
//!
//! # Example
//!
//! ```rust,ignore
//! use fp_extension::clients::HttpError;
//!
//! match client.request(request).await {
//!     Ok(response) => println!("Success: {}", response.body),
//!     Err(HttpError::Response(e)) => println!("API error {}: {}", e.code, e.message),
//!     Err(HttpError::MaxRetries(e)) => println!("Gave up after {} tries", e.tries),
//!     Err(HttpError::InvalidRequest(e)) => println!("Invalid request: {e}"),
//!     Err(HttpError::InvalidResponse { message }) => println!("Bad body: {message}"),
//!     Err(HttpError::Network(e)) => println!("Network error: {e}"),
//! }
//! ```

use thiserror::Error;

/// Error returned when an HTTP request receives a non-successful response.
///
/// The message holds the JSON error fields of the response body
/// (`message`, `error`, `error_description`, `errors`) and an
/// `error_reference` built from the `x-request-id` header.
///
/// # Example
///
/// ```rust
/// use fp_extension::clients::HttpResponseError;
///
/// let error = HttpResponseError {
///     code: 404,
///     message: r#"{"message":"Not found"}"#.to_string(),
///     error_reference: Some("abc-123".to_string()),
/// };
///
/// assert_eq!(error.to_string(), r#"{"message":"Not found"}"#);
/// ```
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpResponseError {
    /// The HTTP status code of the response.
    pub code: u16,
    /// Serialized error message in JSON format.
    pub message: String,
    /// Reference ID for error reporting (from `x-request-id` header).
    pub error_reference: Option<String>,
}

/// Error returned when every retry attempt ended in a gateway error.
#[derive(Debug, Error)]
#[error("Exceeded maximum retry count of {tries}. Last message: {message}")]
pub struct MaxHttpRetriesExceededError {
    /// The HTTP status code of the last response.
    pub code: u16,
    /// The number of tries that were attempted.
    pub tries: u32,
    /// Serialized error message from the last response.
    pub message: String,
    /// Reference ID for error reporting (from `x-request-id` header).
    pub error_reference: Option<String>,
}

/// Error returned when an HTTP request fails validation before sending.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidHttpRequestError {
    /// A request body was provided without specifying the body type.
    #[error("Cannot set a body without also setting body_type.")]
    MissingBodyType,

    /// A POST or PUT request was made without a body.
    #[error("Cannot use {method} without specifying data.")]
    MissingBody {
        /// The HTTP method that requires a body.
        method: String,
    },

    /// An authenticated call was attempted with a session that has no token.
    #[error("Session '{session_id}' has no access token.")]
    MissingAccessToken {
        /// The session lacking a token.
        session_id: String,
    },
}

/// Unified error type for all HTTP-related errors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// An HTTP response error (non-2xx status code).
    #[error(transparent)]
    Response(#[from] HttpResponseError),

    /// Maximum retry attempts exhausted.
    #[error(transparent)]
    MaxRetries(#[from] MaxHttpRetriesExceededError),

    /// Request validation failed.
    #[error(transparent)]
    InvalidRequest(#[from] InvalidHttpRequestError),

    /// A successful response did not have the expected shape.
    #[error("Malformed response body: {message}")]
    InvalidResponse {
        /// What could not be decoded.
        message: String,
    },

    /// Network or connection error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl HttpError {
    /// Returns the HTTP status of the failed response, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Response(e) => Some(e.code),
            Self::MaxRetries(e) => Some(e.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_response_error_displays_message() {
        let error = HttpResponseError {
            code: 404,
            message: r#"{"message":"Not Found"}"#.to_string(),
            error_reference: None,
        };
        assert_eq!(error.to_string(), r#"{"message":"Not Found"}"#);
    }

    #[test]
    fn test_max_retries_error_includes_retry_count() {
        let error = MaxHttpRetriesExceededError {
            code: 503,
            tries: 5,
            message: r#"{"message":"Service unavailable"}"#.to_string(),
            error_reference: None,
        };
        let message = error.to_string();
        assert!(message.contains('5'));
        assert!(message.contains("Exceeded maximum retry count"));
    }

    #[test]
    fn test_invalid_request_error_missing_body() {
        let error = InvalidHttpRequestError::MissingBody {
            method: "post".to_string(),
        };
        assert_eq!(error.to_string(), "Cannot use post without specifying data.");
    }

    #[test]
    fn test_missing_access_token_names_session() {
        let error = InvalidHttpRequestError::MissingAccessToken {
            session_id: "sid".to_string(),
        };
        assert!(error.to_string().contains("sid"));
    }

    #[test]
    fn test_status_of_response_errors() {
        let error: HttpError = HttpResponseError {
            code: 401,
            message: String::new(),
            error_reference: None,
        }
        .into();
        assert_eq!(error.status(), Some(401));

        let error = HttpError::InvalidResponse {
            message: "missing items".to_string(),
        };
        assert_eq!(error.status(), None);
    }
}
