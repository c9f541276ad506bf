//! HTTP client types for platform API communication.
//!
//! # Overview
//!
//! - [`HttpClient`]: async HTTP client bound to a cluster, with gateway retries
//! - [`HttpRequest`]: a request to be sent to the API
//! - [`HttpResponse`]: a parsed response from the API
//! - [`HttpMethod`]: supported HTTP methods (GET, POST, PUT, DELETE)
//! - [`DataType`]: content types for request bodies
//! - [`PlatformClient`]: webhook subscriber endpoints, implemented by [`PlatformApiClient`]
//!
//! # Example
//!
//! ```rust,ignore
//! use fp_extension::clients::{HttpClient, HttpMethod, HttpRequest};
//!
//! let client = HttpClient::from_config(&config);
//!
//! let request = HttpRequest::builder(HttpMethod::Get, "/service/common/webhook/v1.0/events")
//!     .bearer_auth(&token)
//!     .build()
//!     .unwrap();
//!
//! let response = client.request(request).await?;
//! ```
//!
//! # Retry Behavior
//!
//! Responses with status 502, 503 or 504 are retried with a capped linear
//! backoff (see [`RetryPolicy`](crate::RetryPolicy)). Every other error is
//! returned immediately.

mod errors;
mod http_client;
mod http_request;
mod http_response;
mod platform;

pub use errors::{
    HttpError, HttpResponseError, InvalidHttpRequestError, MaxHttpRetriesExceededError,
};
pub use http_client::{HttpClient, SDK_VERSION};
pub use http_request::{DataType, HttpMethod, HttpRequest, HttpRequestBuilder};
pub use http_response::HttpResponse;
pub use platform::{PlatformApiClient, PlatformClient};

#[cfg(test)]
pub(crate) use http_client::instant_retry_policy;
