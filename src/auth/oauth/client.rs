//! OAuth collaborator: authorization URLs and code exchange.
//!
//! [`OAuthClient`] is the seam the install flow talks to. [`PlatformOAuthClient`]
//! implements it against the cluster's panel authentication endpoints.

use async_trait::async_trait;
use serde::Serialize;

use crate::auth::oauth::error::OAuthError;
use crate::auth::{AccessMode, AccessToken};
use crate::clients::{DataType, HttpClient, HttpError, HttpMethod, HttpRequest};
use crate::config::{ApiKey, ApiSecret, ExtensionConfig};

/// Parameters of the authorize redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Tenant being installed.
    pub company_id: String,
    /// Requested scopes, in order.
    pub scopes: Vec<String>,
    /// Where the platform redirects back to with `code` and `state`.
    pub redirect_uri: String,
    /// Anti-forgery nonce.
    pub state: String,
    /// Grant type requested.
    pub access_mode: AccessMode,
}

/// The platform's OAuth endpoints as seen by the install flow.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Builds the URL the browser is redirected to for consent.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidInput`] if the request cannot be encoded.
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, OAuthError>;

    /// Exchanges the authorization code of a redirect for an online token.
    async fn verify_callback(&self, company_id: &str, code: &str)
        -> Result<AccessToken, OAuthError>;

    /// Exchanges the authorization code for a tenant-keyed offline token.
    async fn offline_access_token(
        &self,
        company_id: &str,
        scopes: &[String],
        code: &str,
    ) -> Result<AccessToken, OAuthError>;
}

#[derive(Serialize)]
struct AuthorizationCodeGrant<'a> {
    grant_type: &'static str,
    code: &'a str,
}

#[derive(Serialize)]
struct OfflineTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    scope: &'a [String],
    code: &'a str,
}

/// [`OAuthClient`] over the cluster's authentication API.
///
/// # Example
///
/// ```rust
/// use fp_extension::auth::oauth::{AuthorizationRequest, OAuthClient, PlatformOAuthClient};
/// use fp_extension::{AccessMode, ApiKey, ApiSecret, BaseUrl, ExtensionConfig};
///
/// let config = ExtensionConfig::builder()
///     .api_key(ApiKey::new("key").unwrap())
///     .api_secret(ApiSecret::new("secret").unwrap())
///     .base_url(BaseUrl::new("https://ext.example.com").unwrap())
///     .build()
///     .unwrap();
/// let client = PlatformOAuthClient::from_config(&config);
///
/// let url = client
///     .authorization_url(&AuthorizationRequest {
///         company_id: "1".to_string(),
///         scopes: vec!["company/products".to_string()],
///         redirect_uri: config.auth_callback_url(),
///         state: "nonce".to_string(),
///         access_mode: AccessMode::Online,
///     })
///     .unwrap();
///
/// assert!(url.starts_with(
///     "https://api.fynd.com/service/panel/authentication/v1.0/company/1/oauth/authorize?client_id=key"
/// ));
/// ```
#[derive(Clone, Debug)]
pub struct PlatformOAuthClient {
    http_client: HttpClient,
    api_key: ApiKey,
    api_secret: ApiSecret,
}

// Verify PlatformOAuthClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PlatformOAuthClient>();
};

impl PlatformOAuthClient {
    /// Creates a client sending token requests through `http_client`.
    #[must_use]
    pub const fn new(http_client: HttpClient, api_key: ApiKey, api_secret: ApiSecret) -> Self {
        Self {
            http_client,
            api_key,
            api_secret,
        }
    }

    /// Creates a client for the configured cluster and credentials.
    #[must_use]
    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self {
            http_client: HttpClient::from_config(config),
            api_key: config.api_key().clone(),
            api_secret: config.api_secret().clone(),
        }
    }

    fn oauth_path(company_id: &str, endpoint: &str) -> String {
        format!(
            "/service/panel/authentication/v1.0/company/{}/oauth/{endpoint}",
            urlencoding::encode(company_id)
        )
    }

    async fn post_token(
        &self,
        request: HttpRequest,
        company_id: &str,
    ) -> Result<AccessToken, OAuthError> {
        let response = self
            .http_client
            .request(request)
            .await
            .map_err(token_exchange_error)?;

        let token: AccessToken = response.json().map_err(token_exchange_error)?;
        tracing::debug!(
            company_id = %company_id,
            access_mode = ?token.access_mode,
            expires_in = ?token.expires_in,
            "Token exchanged"
        );
        Ok(token)
    }
}

/// Maps non-2xx token responses to `TokenExchangeFailed`, keeping transport
/// errors as they are.
fn token_exchange_error(error: HttpError) -> OAuthError {
    match error {
        HttpError::Response(e) => OAuthError::TokenExchangeFailed {
            status: e.code,
            message: e.message,
        },
        HttpError::MaxRetries(e) => OAuthError::TokenExchangeFailed {
            status: e.code,
            message: e.message,
        },
        HttpError::InvalidResponse { message } => OAuthError::TokenExchangeFailed {
            status: 200,
            message: format!("Failed to parse token response: {message}"),
        },
        other => OAuthError::Http(other),
    }
}

#[async_trait]
impl OAuthClient for PlatformOAuthClient {
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, OAuthError> {
        if request.company_id.is_empty() {
            return Err(OAuthError::invalid_company_id());
        }

        let scope = request.scopes.join(",");
        let params = [
            ("client_id", self.api_key.as_ref()),
            ("scope", scope.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("state", request.state.as_str()),
            ("access_mode", request.access_mode.as_str()),
            ("response_type", "code"),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "{}?{query_string}",
            self.http_client
                .base_url()
                .join(&Self::oauth_path(&request.company_id, "authorize"))
        ))
    }

    async fn verify_callback(
        &self,
        company_id: &str,
        code: &str,
    ) -> Result<AccessToken, OAuthError> {
        let body = serde_json::to_value(AuthorizationCodeGrant {
            grant_type: "authorization_code",
            code,
        })
        .map_err(|e| OAuthError::InvalidInput {
            reason: e.to_string(),
        })?;

        let request = HttpRequest::builder(HttpMethod::Post, Self::oauth_path(company_id, "token"))
            .body(body)
            .body_type(DataType::Json)
            .basic_auth(self.api_key.as_ref(), self.api_secret.as_ref())
            .build()
            .map_err(HttpError::from)?;

        self.post_token(request, company_id).await
    }

    async fn offline_access_token(
        &self,
        company_id: &str,
        scopes: &[String],
        code: &str,
    ) -> Result<AccessToken, OAuthError> {
        let body = serde_json::to_value(OfflineTokenRequest {
            client_id: self.api_key.as_ref(),
            client_secret: self.api_secret.as_ref(),
            grant_type: "client_credentials",
            scope: scopes,
            code,
        })
        .map_err(|e| OAuthError::InvalidInput {
            reason: e.to_string(),
        })?;

        let request = HttpRequest::builder(
            HttpMethod::Post,
            Self::oauth_path(company_id, "offline-token"),
        )
        .body(body)
        .body_type(DataType::Json)
        .build()
        .map_err(HttpError::from)?;

        self.post_token(request, company_id).await
    }
}
