//! Webhook configuration and subscriber types.
//!
//! This module contains the declarative [`WebhookConfig`] an extension ships
//! with, the remote records the platform stores for it ([`SubscriberConfig`],
//! [`EventConfig`]) and the handler trait inbound events are dispatched to.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::webhooks::{SalesChannelScope, WebhookConfig};
//!
//! let config = WebhookConfig::builder()
//!     .api_path("/api/v1/webhooks")
//!     .notification_email("ops@example.com")
//!     .event("product/create", "on_product")
//!     .event("product/update", "on_product")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.event_map().len(), 2);
//! assert_eq!(config.sales_channel(), SalesChannelScope::All);
//! assert!(config.subscribe_on_install());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Deserializer, Serialize};

use super::verification::WebhookContext;
use super::WebhookError;
use crate::config::BaseUrl;

/// Boxed future returned by [`WebhookHandler::handle`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builds the catalog key `"{event_name}/{event_type}"`.
#[must_use]
pub fn event_key(event_name: &str, event_type: &str) -> String {
    format!("{event_name}/{event_type}")
}

/// Handler for verified inbound webhook events.
///
/// Implement this trait for each handler name referenced by the event map.
///
/// # Example
///
/// ```rust
/// use fp_extension::webhooks::{BoxFuture, WebhookContext, WebhookError, WebhookHandler};
///
/// struct ProductHandler;
///
/// impl WebhookHandler for ProductHandler {
///     fn handle<'a>(
///         &'a self,
///         context: WebhookContext,
///     ) -> BoxFuture<'a, Result<(), WebhookError>> {
///         Box::pin(async move {
///             println!("{} for company {}", context.event_key(), context.company_id());
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait WebhookHandler: Send + Sync {
    /// Handles one verified event.
    ///
    /// # Errors
    ///
    /// Any error returned here is reported to the caller as
    /// [`WebhookError::ProcessError`].
    fn handle<'a>(&'a self, context: WebhookContext) -> BoxFuture<'a, Result<(), WebhookError>>;
}

/// Status of the remote subscriber record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    /// Deliveries are enabled.
    #[default]
    Active,
    /// Deliveries are paused. The sync engine re-activates it.
    Inactive,
    /// Blocked by the platform.
    Blocked,
}

/// Which sales channels an extension's subscriber covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationCriteria {
    /// Every application of the company.
    #[serde(rename = "ALL")]
    All,
    /// Only the applications listed in the association.
    #[serde(rename = "SPECIFIC-EVENTS")]
    SpecificEvents,
    /// Scoped to specific applications, none of which are selected yet.
    #[serde(rename = "EMPTY")]
    Empty,
}

impl AssociationCriteria {
    /// Returns `true` for the criteria that carry an application list.
    #[must_use]
    pub const fn is_specific(self) -> bool {
        matches!(self, Self::SpecificEvents | Self::Empty)
    }
}

/// Declared sales-channel scoping of the extension's webhooks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SalesChannelScope {
    /// Receive events of every sales channel.
    #[default]
    All,
    /// Receive events only of explicitly enabled sales channels.
    Specific,
}

impl SalesChannelScope {
    /// Wire criteria for this scope with the given application list.
    #[must_use]
    pub fn criteria(self, application_ids: &[String]) -> AssociationCriteria {
        match self {
            Self::All => AssociationCriteria::All,
            Self::Specific if application_ids.is_empty() => AssociationCriteria::Empty,
            Self::Specific => AssociationCriteria::SpecificEvents,
        }
    }
}

/// Company and sales-channel association of a subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Tenant the subscriber belongs to.
    #[serde(deserialize_with = "string_or_number")]
    pub company_id: String,
    /// Sales-channel scoping.
    pub criteria: AssociationCriteria,
    /// Application ids the subscriber is scoped to.
    #[serde(default)]
    pub application_id: Vec<String>,
}

/// Signing metadata the platform uses for deliveries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMeta {
    /// Signing scheme, always `hmac`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Shared signing secret.
    pub secret: String,
}

impl AuthMeta {
    /// HMAC signing metadata with `secret`.
    #[must_use]
    pub fn hmac(secret: impl Into<String>) -> Self {
        Self {
            kind: "hmac".to_string(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for AuthMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMeta")
            .field("kind", &self.kind)
            .field("secret", &"*****")
            .finish()
    }
}

/// Entry of the platform's event catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Remote numeric id.
    pub id: u64,
    /// Event name, e.g. `product`.
    pub event_name: String,
    /// Event type, e.g. `create`.
    pub event_type: String,
}

impl EventConfig {
    /// Catalog key `"{event_name}/{event_type}"`.
    #[must_use]
    pub fn key(&self) -> String {
        event_key(&self.event_name, &self.event_type)
    }
}

/// The extension's remote webhook subscriber for one company.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Remote id, absent until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Display name, the extension's api key.
    pub name: String,
    /// Delivery URL.
    pub webhook_url: String,
    /// Delivery status.
    #[serde(default)]
    pub status: SubscriberStatus,
    /// Address notified about delivery failures.
    pub email_id: String,
    /// Company and sales-channel association.
    pub association: Association,
    /// Signing metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_meta: Option<AuthMeta>,
    /// Subscribed event ids.
    #[serde(default)]
    pub event_id: Vec<u64>,
    /// Subscribed events as the listing endpoint expands them.
    #[serde(default, skip_serializing)]
    pub event_configs: Vec<EventConfig>,
}

impl SubscriberConfig {
    /// The event ids this subscriber is currently subscribed to.
    ///
    /// Listing responses carry expanded `event_configs` instead of `event_id`;
    /// either source is accepted.
    #[must_use]
    pub fn current_event_ids(&self) -> BTreeSet<u64> {
        if self.event_id.is_empty() {
            self.event_configs.iter().map(|event| event.id).collect()
        } else {
            self.event_id.iter().copied().collect()
        }
    }
}

/// Result of a subscriber sync pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No subscriber existed and one was registered.
    Created {
        /// Remote id of the new subscriber, when the platform returned one.
        id: Option<u64>,
    },
    /// The subscriber had drifted and was updated.
    Updated {
        /// Remote id of the subscriber.
        id: Option<u64>,
    },
    /// The subscriber already matched; nothing was sent.
    Unchanged {
        /// Remote id of the subscriber.
        id: Option<u64>,
    },
}

/// Declarative webhook configuration of an extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    api_path: String,
    notification_email: String,
    event_map: BTreeMap<String, String>,
    subscribe_on_install: bool,
    sales_channel: SalesChannelScope,
}

impl WebhookConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> WebhookConfigBuilder {
        WebhookConfigBuilder::new()
    }

    /// Path the webhook endpoint is mounted on, relative to the base URL.
    #[must_use]
    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// Address notified about delivery failures.
    #[must_use]
    pub fn notification_email(&self) -> &str {
        &self.notification_email
    }

    /// `"name/type"` event keys mapped to handler names.
    #[must_use]
    pub const fn event_map(&self) -> &BTreeMap<String, String> {
        &self.event_map
    }

    /// Whether install and auto-install sync the subscriber.
    #[must_use]
    pub const fn subscribe_on_install(&self) -> bool {
        self.subscribe_on_install
    }

    /// Sales-channel scoping.
    #[must_use]
    pub const fn sales_channel(&self) -> SalesChannelScope {
        self.sales_channel
    }

    /// Full delivery URL under `base_url`.
    #[must_use]
    pub fn webhook_url(&self, base_url: &BaseUrl) -> String {
        base_url.join(&self.api_path)
    }
}

/// Builder for [`WebhookConfig`].
#[derive(Debug)]
pub struct WebhookConfigBuilder {
    api_path: Option<String>,
    notification_email: Option<String>,
    event_map: BTreeMap<String, String>,
    subscribe_on_install: bool,
    sales_channel: SalesChannelScope,
}

impl Default for WebhookConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookConfigBuilder {
    /// Creates a builder with `subscribe_on_install` enabled and the `All` scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_path: None,
            notification_email: None,
            event_map: BTreeMap::new(),
            subscribe_on_install: true,
            sales_channel: SalesChannelScope::All,
        }
    }

    /// Sets the endpoint path. Must start with `/`.
    #[must_use]
    pub fn api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = Some(path.into());
        self
    }

    /// Sets the notification email (required).
    #[must_use]
    pub fn notification_email(mut self, email: impl Into<String>) -> Self {
        self.notification_email = Some(email.into());
        self
    }

    /// Maps the `"name/type"` event key to a handler name.
    #[must_use]
    pub fn event(mut self, key: impl Into<String>, handler: impl Into<String>) -> Self {
        self.event_map.insert(key.into(), handler.into());
        self
    }

    /// Sets whether install flows sync the subscriber.
    #[must_use]
    pub const fn subscribe_on_install(mut self, subscribe: bool) -> Self {
        self.subscribe_on_install = subscribe;
        self
    }

    /// Sets the sales-channel scope.
    #[must_use]
    pub const fn sales_channel(mut self, scope: SalesChannelScope) -> Self {
        self.sales_channel = scope;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidConfig`] if the path is missing or
    /// relative, the email is missing, or an event key is not `name/type`.
    pub fn build(self) -> Result<WebhookConfig, WebhookError> {
        let api_path = self
            .api_path
            .ok_or_else(|| WebhookError::invalid_config("api_path is required"))?;
        if !api_path.starts_with('/') {
            return Err(WebhookError::invalid_config(format!(
                "api_path '{api_path}' must start with '/'"
            )));
        }

        let notification_email = self
            .notification_email
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| WebhookError::invalid_config("notification_email is required"))?;

        for (key, handler) in &self.event_map {
            let well_formed = key
                .split_once('/')
                .is_some_and(|(name, kind)| !name.is_empty() && !kind.is_empty());
            if !well_formed {
                return Err(WebhookError::invalid_config(format!(
                    "event '{key}' must have the form 'name/type'"
                )));
            }
            if handler.trim().is_empty() {
                return Err(WebhookError::invalid_config(format!(
                    "event '{key}' has an empty handler name"
                )));
            }
        }

        Ok(WebhookConfig {
            api_path,
            notification_email,
            event_map: self.event_map,
            subscribe_on_install: self.subscribe_on_install,
            sales_channel: self.sales_channel,
        })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
