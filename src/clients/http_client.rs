//! HTTP client for platform API communication.
//!
//! This module provides the [`HttpClient`] type for sending requests to the
//! platform cluster with automatic retry of gateway errors.

use std::collections::HashMap;

use crate::clients::errors::{HttpError, HttpResponseError, MaxHttpRetriesExceededError};
use crate::clients::http_request::{HttpMethod, HttpRequest};
use crate::clients::http_response::HttpResponse;
use crate::config::{BaseUrl, ExtensionConfig, RetryPolicy};

/// Crate version from Cargo.toml.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP client for requests to the platform cluster.
///
/// The client handles:
/// - URL construction from the cluster URL and the request path
/// - Default `User-Agent` and `Accept` headers
/// - Retry of 502, 503 and 504 responses following a [`RetryPolicy`]
///
/// Authentication is per request (see
/// [`HttpRequestBuilder::bearer_auth`](crate::clients::HttpRequestBuilder::bearer_auth)),
/// so one client can serve every tenant.
///
/// # Thread Safety
///
/// `HttpClient` is `Send + Sync`, making it safe to share across async tasks.
///
/// # Example
///
/// ```rust
/// use fp_extension::clients::HttpClient;
/// use fp_extension::{BaseUrl, RetryPolicy};
///
/// let client = HttpClient::new(
///     BaseUrl::new("https://api.fynd.com").unwrap(),
///     RetryPolicy::default(),
///     None,
/// );
/// assert_eq!(client.base_uri(), "https://api.fynd.com");
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_uri: BaseUrl,
    retry_policy: RetryPolicy,
    default_headers: HashMap<String, String>,
}

// Verify HttpClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<HttpClient>();
};

impl HttpClient {
    /// Creates a client for `base_uri`.
    ///
    /// # Panics
    ///
    /// Panics if the underlying reqwest client cannot be created. This should
    /// only happen in extremely unusual circumstances (e.g., TLS initialization failure).
    #[must_use]
    pub fn new(
        base_uri: BaseUrl,
        retry_policy: RetryPolicy,
        user_agent_prefix: Option<&str>,
    ) -> Self {
        let user_agent_prefix =
            user_agent_prefix.map_or(String::new(), |prefix| format!("{prefix} | "));
        let rust_version = env!("CARGO_PKG_RUST_VERSION");
        let user_agent =
            format!("{user_agent_prefix}FP Extension Library v{SDK_VERSION} | Rust {rust_version}");

        let mut default_headers = HashMap::new();
        default_headers.insert("User-Agent".to_string(), user_agent);
        default_headers.insert("Accept".to_string(), "application/json".to_string());

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_uri,
            retry_policy,
            default_headers,
        }
    }

    /// Creates a client for the configured cluster.
    #[must_use]
    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self::new(
            config.cluster().clone(),
            *config.retry_policy(),
            config.user_agent_prefix(),
        )
    }

    /// Returns the base URI for this client.
    #[must_use]
    pub fn base_uri(&self) -> &str {
        self.base_uri.as_ref()
    }

    /// Returns the cluster URL this client is bound to.
    #[must_use]
    pub const fn base_url(&self) -> &BaseUrl {
        &self.base_uri
    }

    /// Returns the retry policy for this client.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the default headers for this client.
    #[must_use]
    pub const fn default_headers(&self) -> &HashMap<String, String> {
        &self.default_headers
    }

    /// Sends a request to the platform API.
    ///
    /// Responses with status 502, 503 or 504 are retried after the delay the
    /// retry policy gives for the failed attempt. Every other non-2xx status
    /// is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if:
    /// - Request validation fails (`InvalidRequest`)
    /// - Network error occurs (`Network`)
    /// - Non-2xx response received (`Response`)
    /// - Gateway errors persisted through every attempt (`MaxRetries`)
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        request.verify()?;

        let url = self.base_uri.join(&request.path);

        let mut headers = self.default_headers.clone();
        if let Some(body_type) = &request.body_type {
            headers.insert(
                "Content-Type".to_string(),
                body_type.as_content_type().to_string(),
            );
        }
        if let Some(extra) = &request.extra_headers {
            for (key, value) in extra {
                headers.insert(key.clone(), value.clone());
            }
        }

        let max_tries = self.retry_policy.tries.max(1);
        let mut tries: u32 = 0;
        loop {
            tries += 1;

            let mut req_builder = match request.http_method {
                HttpMethod::Get => self.client.get(&url),
                HttpMethod::Post => self.client.post(&url),
                HttpMethod::Put => self.client.put(&url),
                HttpMethod::Delete => self.client.delete(&url),
            };

            for (key, value) in &headers {
                req_builder = req_builder.header(key, value);
            }

            if let Some(query) = &request.query {
                req_builder = req_builder.query(query);
            }

            if let Some(body) = &request.body {
                req_builder = req_builder.body(body.to_string());
            }

            let res = req_builder.send().await?;

            let code = res.status().as_u16();
            let res_headers = Self::parse_response_headers(res.headers());
            let body_text = res.text().await.unwrap_or_default();

            let body = if body_text.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&body_text)
                    .unwrap_or_else(|_| serde_json::json!({ "raw_body": body_text }))
            };

            let response = HttpResponse::new(code, res_headers, body);

            if response.is_ok() {
                return Ok(response);
            }

            let error_message = Self::serialize_error(&response);
            let error_reference = response.request_id().map(String::from);

            if !response.is_gateway_error() {
                return Err(HttpError::Response(HttpResponseError {
                    code,
                    message: error_message,
                    error_reference,
                }));
            }

            if tries >= max_tries {
                if max_tries == 1 {
                    return Err(HttpError::Response(HttpResponseError {
                        code,
                        message: error_message,
                        error_reference,
                    }));
                }
                return Err(HttpError::MaxRetries(MaxHttpRetriesExceededError {
                    code,
                    tries: max_tries,
                    message: error_message,
                    error_reference,
                }));
            }

            let delay = self.retry_policy.delay_for_attempt(tries);
            tracing::warn!(
                path = %request.path,
                status = code,
                attempt = tries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Platform gateway error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn parse_response_headers(
        headers: &reqwest::header::HeaderMap,
    ) -> HashMap<String, Vec<String>> {
        let mut result: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers {
            let key = name.as_str().to_lowercase();
            let value = value.to_str().unwrap_or_default().to_string();
            result.entry(key).or_default().push(value);
        }
        result
    }

    /// Collects the error fields of a failed response into a JSON string.
    fn serialize_error(response: &HttpResponse) -> String {
        let mut error_body = serde_json::Map::new();

        for field in ["message", "errors", "error", "error_description", "raw_body"] {
            if let Some(value) = response.body.get(field) {
                error_body.insert(field.to_string(), value.clone());
            }
        }

        if let Some(request_id) = response.request_id() {
            error_body.insert(
                "error_reference".to_string(),
                serde_json::json!(format!(
                    "If you report this error, please include this id: {request_id}."
                )),
            );
        }

        serde_json::to_string(&error_body).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Zero-delay policy for tests that exercise the retry loop.
#[cfg(test)]
pub(crate) fn instant_retry_policy(tries: u32) -> RetryPolicy {
    RetryPolicy {
        base_delay: std::time::Duration::ZERO,
        step: std::time::Duration::ZERO,
        linear_after: 3,
        max_delay: std::time::Duration::ZERO,
        tries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> HttpClient {
        HttpClient::new(
            BaseUrl::new("https://api.example.com").unwrap(),
            instant_retry_policy(3),
            None,
        )
    }

    #[test]
    fn test_user_agent_header_format() {
        let client = client();
        let user_agent = client.default_headers().get("User-Agent").unwrap();
        assert!(user_agent.starts_with("FP Extension Library v"));
        assert!(user_agent.contains("Rust"));
    }

    #[test]
    fn test_user_agent_with_prefix() {
        let client = HttpClient::new(
            BaseUrl::new("https://api.example.com").unwrap(),
            RetryPolicy::default(),
            Some("MyExtension/1.0"),
        );
        let user_agent = client.default_headers().get("User-Agent").unwrap();
        assert!(user_agent.starts_with("MyExtension/1.0 | "));
    }

    #[test]
    fn test_accept_header_is_json() {
        assert_eq!(
            client().default_headers().get("Accept"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_serialize_error_collects_known_fields() {
        let mut headers = HashMap::new();
        headers.insert("x-request-id".to_string(), vec!["abc".to_string()]);
        let response = HttpResponse::new(
            400,
            headers,
            json!({"message": "bad", "other": "ignored"}),
        );

        let serialized: serde_json::Value =
            serde_json::from_str(&HttpClient::serialize_error(&response)).unwrap();
        assert_eq!(serialized["message"], "bad");
        assert!(serialized.get("other").is_none());
        assert!(serialized["error_reference"]
            .as_str()
            .unwrap()
            .contains("abc"));
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpClient>();
    }
}
