//! Platform API client for webhook subscriber management.
//!
//! This module provides the [`PlatformClient`] trait consumed by the webhook
//! sync engine and [`PlatformApiClient`], its HTTP implementation.

use async_trait::async_trait;

use crate::auth::Session;
use crate::clients::errors::InvalidHttpRequestError;
use crate::clients::{DataType, HttpClient, HttpError, HttpMethod, HttpRequest};
use crate::config::ExtensionConfig;
use crate::webhooks::{EventConfig, SubscriberConfig};

const EVENTS_PATH: &str = "/service/common/webhook/v1.0/events";

/// Platform endpoints the webhook sync engine depends on.
///
/// Every call is authenticated with the access token of `session`, on
/// behalf of `session.company_id`.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetches the platform's webhook event catalog.
    async fn fetch_all_event_configurations(
        &self,
        session: &Session,
    ) -> Result<Vec<EventConfig>, HttpError>;

    /// Lists this extension's subscribers for the session's company.
    async fn get_subscribers_by_extension_id(
        &self,
        session: &Session,
        extension_id: &str,
    ) -> Result<Vec<SubscriberConfig>, HttpError>;

    /// Creates a subscriber.
    async fn register_subscriber_to_event(
        &self,
        session: &Session,
        subscriber: &SubscriberConfig,
    ) -> Result<SubscriberConfig, HttpError>;

    /// Replaces an existing subscriber.
    async fn update_subscriber_config(
        &self,
        session: &Session,
        subscriber: &SubscriberConfig,
    ) -> Result<SubscriberConfig, HttpError>;
}

/// [`PlatformClient`] over the cluster's REST API.
///
/// # Example
///
/// ```rust
/// use fp_extension::clients::PlatformApiClient;
/// use fp_extension::{ApiKey, ApiSecret, BaseUrl, ExtensionConfig};
///
/// let config = ExtensionConfig::builder()
///     .api_key(ApiKey::new("key").unwrap())
///     .api_secret(ApiSecret::new("secret").unwrap())
///     .base_url(BaseUrl::new("https://ext.example.com").unwrap())
///     .build()
///     .unwrap();
///
/// let client = PlatformApiClient::from_config(&config);
/// assert_eq!(client.http_client().base_uri(), "https://api.fynd.com");
/// ```
#[derive(Clone, Debug)]
pub struct PlatformApiClient {
    http_client: HttpClient,
}

// Verify PlatformApiClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PlatformApiClient>();
};

impl PlatformApiClient {
    /// Creates a client that sends requests through `http_client`.
    #[must_use]
    pub const fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    /// Creates a client for the configured cluster.
    #[must_use]
    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self::new(HttpClient::from_config(config))
    }

    /// The underlying HTTP client.
    #[must_use]
    pub const fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    fn subscriber_path(company_id: &str) -> String {
        format!(
            "/service/platform/webhook/v1.0/company/{}/subscriber",
            urlencoding::encode(company_id)
        )
    }

    fn access_token(session: &Session) -> Result<&str, HttpError> {
        session
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                InvalidHttpRequestError::MissingAccessToken {
                    session_id: session.id.clone(),
                }
                .into()
            })
    }

    async fn send_subscriber(
        &self,
        method: HttpMethod,
        session: &Session,
        subscriber: &SubscriberConfig,
    ) -> Result<SubscriberConfig, HttpError> {
        let body = serde_json::to_value(subscriber).map_err(|e| HttpError::InvalidResponse {
            message: e.to_string(),
        })?;
        let request = HttpRequest::builder(method, Self::subscriber_path(&session.company_id))
            .body(body)
            .body_type(DataType::Json)
            .bearer_auth(Self::access_token(session)?)
            .build()?;

        self.http_client.request(request).await?.json()
    }
}

#[async_trait]
impl PlatformClient for PlatformApiClient {
    async fn fetch_all_event_configurations(
        &self,
        session: &Session,
    ) -> Result<Vec<EventConfig>, HttpError> {
        let request = HttpRequest::builder(HttpMethod::Get, EVENTS_PATH)
            .bearer_auth(Self::access_token(session)?)
            .build()?;

        self.http_client
            .request(request)
            .await?
            .json_field("event_configs")
    }

    async fn get_subscribers_by_extension_id(
        &self,
        session: &Session,
        extension_id: &str,
    ) -> Result<Vec<SubscriberConfig>, HttpError> {
        let path = format!(
            "/service/platform/webhook/v1.0/company/{}/extension/{}/subscriber",
            urlencoding::encode(&session.company_id),
            urlencoding::encode(extension_id)
        );
        let request = HttpRequest::builder(HttpMethod::Get, path)
            .bearer_auth(Self::access_token(session)?)
            .build()?;

        self.http_client.request(request).await?.json_field("items")
    }

    async fn register_subscriber_to_event(
        &self,
        session: &Session,
        subscriber: &SubscriberConfig,
    ) -> Result<SubscriberConfig, HttpError> {
        tracing::debug!(company_id = %session.company_id, "Registering webhook subscriber");
        self.send_subscriber(HttpMethod::Post, session, subscriber)
            .await
    }

    async fn update_subscriber_config(
        &self,
        session: &Session,
        subscriber: &SubscriberConfig,
    ) -> Result<SubscriberConfig, HttpError> {
        tracing::debug!(
            company_id = %session.company_id,
            subscriber_id = ?subscriber.id,
            "Updating webhook subscriber"
        );
        self.send_subscriber(HttpMethod::Put, session, subscriber)
            .await
    }
}
