//! Configuration types for the extension runtime.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`ExtensionConfig`]: The configuration struct holding all extension settings
//! - [`ExtensionConfigBuilder`]: A builder for constructing [`ExtensionConfig`] instances
//! - [`ApiKey`] / [`ApiSecret`]: Validated credentials (the secret is masked in `Debug`)
//! - [`BaseUrl`]: A validated URL used for the extension host and the platform cluster
//! - [`RetryPolicy`]: Backoff settings for platform API calls
//!
//! # Example
//!
//! ```rust
//! use fp_extension::{AccessMode, ApiKey, ApiSecret, BaseUrl, ExtensionConfig};
//!
//! let config = ExtensionConfig::builder()
//!     .api_key(ApiKey::new("ext-api-key").unwrap())
//!     .api_secret(ApiSecret::new("ext-api-secret").unwrap())
//!     .base_url(BaseUrl::new("https://extension.example.com").unwrap())
//!     .scopes(["company/products", "company/orders"])
//!     .access_mode(AccessMode::Offline)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.auth_callback_url(), "https://extension.example.com/fp/auth");
//! ```

mod newtypes;

use std::time::Duration;

pub use newtypes::{ApiKey, ApiSecret, BaseUrl};

use crate::auth::AccessMode;
use crate::error::ConfigError;

/// Platform cluster used when none is configured.
pub const DEFAULT_CLUSTER: &str = "https://api.fynd.com";

/// Path of the OAuth redirect handler, relative to the base URL.
pub const AUTH_CALLBACK_PATH: &str = "/fp/auth";

/// Lifetime of the browser session created at install time.
pub const DEFAULT_INSTALL_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Backoff settings for calls against the platform API.
///
/// Attempt `n` (1-based) that failed with 502/503/504 waits `base_delay`
/// while `n <= linear_after`, then `base_delay + step × (n - linear_after)`,
/// never more than `max_delay`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use fp_extension::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(30));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(30));
/// assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(90));
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(150));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay applied to the first attempts.
    pub base_delay: Duration,
    /// Increment added per attempt after `linear_after`.
    pub step: Duration,
    /// Number of attempts that use the flat `base_delay`.
    pub linear_after: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Total attempts before giving up (1 disables retries).
    pub tries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            step: Duration::from_secs(60),
            linear_after: 3,
            max_delay: Duration::from_secs(300),
            tries: 5,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            tries: 1,
            ..Self::default()
        }
    }

    /// Returns the wait after the given failed attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let extra = attempt.saturating_sub(self.linear_after);
        let delay = self.base_delay + self.step.saturating_mul(extra);
        delay.min(self.max_delay)
    }
}

/// Configuration for the extension runtime.
///
/// # Thread Safety
///
/// `ExtensionConfig` is `Clone`, `Send`, and `Sync`; share it behind an `Arc`
/// across request handlers.
#[derive(Clone, Debug)]
pub struct ExtensionConfig {
    api_key: ApiKey,
    api_secret: ApiSecret,
    base_url: BaseUrl,
    scopes: Vec<String>,
    access_mode: AccessMode,
    cluster: BaseUrl,
    retry_policy: RetryPolicy,
    install_session_ttl: Duration,
    user_agent_prefix: Option<String>,
}

impl ExtensionConfig {
    /// Creates a new builder for constructing an `ExtensionConfig`.
    #[must_use]
    pub fn builder() -> ExtensionConfigBuilder {
        ExtensionConfigBuilder::new()
    }

    /// Returns the API key (also the extension id).
    #[must_use]
    pub const fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the API secret.
    #[must_use]
    pub const fn api_secret(&self) -> &ApiSecret {
        &self.api_secret
    }

    /// Returns the extension's public base URL.
    #[must_use]
    pub const fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Returns the requested scopes, in declaration order.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the configured access mode.
    #[must_use]
    pub const fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Returns `true` when installs also mint a tenant-keyed offline session.
    #[must_use]
    pub fn is_offline_mode(&self) -> bool {
        self.access_mode == AccessMode::Offline
    }

    /// Returns the platform cluster URL.
    #[must_use]
    pub const fn cluster(&self) -> &BaseUrl {
        &self.cluster
    }

    /// Returns the retry policy for platform API calls.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns how long the install-time browser session lives.
    #[must_use]
    pub const fn install_session_ttl(&self) -> Duration {
        self.install_session_ttl
    }

    /// Returns the user agent prefix, if configured.
    #[must_use]
    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }

    /// Returns the OAuth redirect target handled by the authorize endpoint.
    #[must_use]
    pub fn auth_callback_url(&self) -> String {
        self.base_url.join(AUTH_CALLBACK_PATH)
    }
}

// Verify ExtensionConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ExtensionConfig>();
};

/// Builder for constructing [`ExtensionConfig`] instances.
///
/// Required fields are `api_key`, `api_secret` and `base_url`.
///
/// # Defaults
///
/// - `scopes`: Empty
/// - `access_mode`: [`AccessMode::Online`]
/// - `cluster`: [`DEFAULT_CLUSTER`]
/// - `retry_policy`: [`RetryPolicy::default`]
/// - `install_session_ttl`: 15 minutes
/// - `user_agent_prefix`: `None`
#[derive(Debug, Default)]
pub struct ExtensionConfigBuilder {
    api_key: Option<ApiKey>,
    api_secret: Option<ApiSecret>,
    base_url: Option<BaseUrl>,
    scopes: Vec<String>,
    access_mode: Option<AccessMode>,
    cluster: Option<BaseUrl>,
    retry_policy: Option<RetryPolicy>,
    install_session_ttl: Option<Duration>,
    user_agent_prefix: Option<String>,
}

impl ExtensionConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key (required).
    #[must_use]
    pub fn api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets the API secret (required).
    #[must_use]
    pub fn api_secret(mut self, secret: ApiSecret) -> Self {
        self.api_secret = Some(secret);
        self
    }

    /// Sets the extension's base URL (required).
    #[must_use]
    pub fn base_url(mut self, url: BaseUrl) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the requested scopes. Order is preserved.
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the access mode.
    #[must_use]
    pub const fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }

    /// Sets the platform cluster URL.
    #[must_use]
    pub fn cluster(mut self, cluster: BaseUrl) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Sets the retry policy for platform API calls.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the lifetime of install-time browser sessions.
    #[must_use]
    pub const fn install_session_ttl(mut self, ttl: Duration) -> Self {
        self.install_session_ttl = Some(ttl);
        self
    }

    /// Sets the user agent prefix for HTTP requests.
    #[must_use]
    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Builds the [`ExtensionConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if a required field is
    /// not set and [`ConfigError::InvalidScopes`] if a scope is blank.
    pub fn build(self) -> Result<ExtensionConfig, ConfigError> {
        let api_key = self
            .api_key
            .ok_or(ConfigError::MissingRequiredField { field: "api_key" })?;
        let api_secret = self
            .api_secret
            .ok_or(ConfigError::MissingRequiredField {
                field: "api_secret",
            })?;
        let base_url = self
            .base_url
            .ok_or(ConfigError::MissingRequiredField { field: "base_url" })?;

        if self.scopes.iter().any(|scope| scope.trim().is_empty()) {
            return Err(ConfigError::InvalidScopes {
                reason: "scope entries cannot be blank".to_string(),
            });
        }

        let cluster = match self.cluster {
            Some(cluster) => cluster,
            None => BaseUrl::new(DEFAULT_CLUSTER)?,
        };

        Ok(ExtensionConfig {
            api_key,
            api_secret,
            base_url,
            scopes: self.scopes,
            access_mode: self.access_mode.unwrap_or_default(),
            cluster,
            retry_policy: self.retry_policy.unwrap_or_default(),
            install_session_ttl: self
                .install_session_ttl
                .unwrap_or(DEFAULT_INSTALL_SESSION_TTL),
            user_agent_prefix: self.user_agent_prefix,
        })
    }
}
