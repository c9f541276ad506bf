//! HTTP response type.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::clients::errors::HttpError;

/// An HTTP response from the platform API.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub code: u16,
    /// Response headers, lowercased (headers may have multiple values).
    pub headers: HashMap<String, Vec<String>>,
    /// The parsed response body (`{}` when empty).
    pub body: serde_json::Value,
}

impl HttpResponse {
    /// Creates a new `HttpResponse`.
    #[must_use]
    pub const fn new(
        code: u16,
        headers: HashMap<String, Vec<String>>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            code,
            headers,
            body,
        }
    }

    /// Returns `true` if the response status code is in the 2xx range.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code >= 200 && self.code <= 299
    }

    /// Returns `true` for 502, 503 and 504, the statuses worth retrying.
    #[must_use]
    pub const fn is_gateway_error(&self) -> bool {
        matches!(self.code, 502..=504)
    }

    /// Returns the `x-request-id` header value, if present.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get("x-request-id")
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Deserializes the whole body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidResponse`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_value(self.body.clone()).map_err(|e| HttpError::InvalidResponse {
            message: e.to_string(),
        })
    }

    /// Deserializes the body field `field` into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidResponse`] if the field is missing or does
    /// not match `T`.
    pub fn json_field<T: DeserializeOwned>(&self, field: &str) -> Result<T, HttpError> {
        let value = self
            .body
            .get(field)
            .cloned()
            .ok_or_else(|| HttpError::InvalidResponse {
                message: format!("missing field `{field}`"),
            })?;
        serde_json::from_value(value).map_err(|e| HttpError::InvalidResponse {
            message: format!("field `{field}`: {e}"),
        })
    }
}
