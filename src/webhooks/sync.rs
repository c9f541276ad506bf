//! Reconciliation of the declared webhook configuration with the remote subscriber.
//!
//! Each extension owns at most one subscriber per company. A sync pass
//! fetches the platform's event catalog and the existing subscriber, then
//! either creates the subscriber or updates it when one of the checked
//! fields drifted:
//!
//! - notification email
//! - webhook URL
//! - association criteria (switching to `ALL` clears the application list)
//! - HMAC signing secret
//! - subscribed event ids
//!
//! A subscriber that already matches is left alone, so repeated syncs send
//! no update.

use std::collections::BTreeSet;

use crate::auth::Session;
use crate::clients::PlatformClient;
use crate::config::ExtensionConfig;

use super::errors::WebhookError;
use super::types::{
    Association, AssociationCriteria, AuthMeta, EventConfig, SalesChannelScope, SubscriberConfig,
    SubscriberStatus, SyncOutcome, WebhookConfig,
};

/// Keeps the remote subscriber in line with a [`WebhookConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use fp_extension::clients::PlatformApiClient;
/// use fp_extension::webhooks::WebhookSyncEngine;
///
/// let engine = WebhookSyncEngine::new(webhook_config, &extension_config);
/// let client = PlatformApiClient::from_config(&extension_config);
///
/// let outcome = engine.sync_events(&client, &offline_session).await?;
/// ```
#[derive(Clone, Debug)]
pub struct WebhookSyncEngine {
    config: WebhookConfig,
    extension_id: String,
    webhook_url: String,
    secret: String,
}

// Verify WebhookSyncEngine is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WebhookSyncEngine>();
};

impl WebhookSyncEngine {
    /// Creates an engine for `config` on behalf of the configured extension.
    ///
    /// The subscriber is named after the api key and signed with the api secret.
    #[must_use]
    pub fn new(config: WebhookConfig, extension: &ExtensionConfig) -> Self {
        let webhook_url = config.webhook_url(extension.base_url());
        Self {
            config,
            extension_id: extension.api_key().as_ref().to_string(),
            webhook_url,
            secret: extension.api_secret().as_ref().to_string(),
        }
    }

    /// The declared configuration.
    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// The delivery URL registered with the platform.
    #[must_use]
    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Creates or reconciles the subscriber for `session.company_id`.
    ///
    /// Event-map keys missing from the platform catalog are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::RegistrationError`] if a platform call fails
    /// or returns a malformed body.
    pub async fn sync_events(
        &self,
        client: &dyn PlatformClient,
        session: &Session,
    ) -> Result<SyncOutcome, WebhookError> {
        let catalog = client.fetch_all_event_configurations(session).await?;
        let event_ids = self.resolve_event_ids(&catalog);

        let Some(mut subscriber) = self.existing_subscriber(client, session).await? else {
            let subscriber = self.new_subscriber(&session.company_id, &event_ids);
            let created = client
                .register_subscriber_to_event(session, &subscriber)
                .await?;
            tracing::info!(
                company_id = %session.company_id,
                subscriber_id = ?created.id,
                events = event_ids.len(),
                "Webhook subscriber created"
            );
            return Ok(SyncOutcome::Created { id: created.id });
        };

        if !self.reconcile(&mut subscriber, &event_ids) {
            tracing::debug!(
                company_id = %session.company_id,
                subscriber_id = ?subscriber.id,
                "Webhook subscriber up to date"
            );
            return Ok(SyncOutcome::Unchanged { id: subscriber.id });
        }

        client.update_subscriber_config(session, &subscriber).await?;
        tracing::info!(
            company_id = %session.company_id,
            subscriber_id = ?subscriber.id,
            "Webhook subscriber updated"
        );
        Ok(SyncOutcome::Updated { id: subscriber.id })
    }

    /// Adds `application_id` to the subscriber's sales-channel list.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidConfig`] unless the scope is
    /// [`SalesChannelScope::Specific`], and
    /// [`WebhookError::RegistrationError`] if no subscriber exists or a
    /// platform call fails.
    pub async fn enable_sales_channel_webhook(
        &self,
        client: &dyn PlatformClient,
        session: &Session,
        application_id: &str,
    ) -> Result<SyncOutcome, WebhookError> {
        self.update_sales_channels(client, session, |ids| {
            if ids.iter().any(|id| id == application_id) {
                false
            } else {
                ids.push(application_id.to_string());
                true
            }
        })
        .await
    }

    /// Removes `application_id` from the subscriber's sales-channel list.
    ///
    /// # Errors
    ///
    /// Same as [`enable_sales_channel_webhook`](Self::enable_sales_channel_webhook).
    pub async fn disable_sales_channel_webhook(
        &self,
        client: &dyn PlatformClient,
        session: &Session,
        application_id: &str,
    ) -> Result<SyncOutcome, WebhookError> {
        self.update_sales_channels(client, session, |ids| {
            let before = ids.len();
            ids.retain(|id| id != application_id);
            ids.len() != before
        })
        .await
    }

    async fn update_sales_channels(
        &self,
        client: &dyn PlatformClient,
        session: &Session,
        change: impl FnOnce(&mut Vec<String>) -> bool + Send,
    ) -> Result<SyncOutcome, WebhookError> {
        if self.config.sales_channel() != SalesChannelScope::Specific {
            return Err(WebhookError::invalid_config(
                "sales channel webhooks require the Specific sales channel scope",
            ));
        }

        let mut subscriber = self
            .existing_subscriber(client, session)
            .await?
            .ok_or_else(|| WebhookError::RegistrationError {
                message: "Subscriber config not found".to_string(),
            })?;

        if !change(&mut subscriber.association.application_id) {
            return Ok(SyncOutcome::Unchanged { id: subscriber.id });
        }

        subscriber.association.criteria = SalesChannelScope::Specific
            .criteria(&subscriber.association.application_id);
        subscriber.event_id = subscriber.current_event_ids().into_iter().collect();

        client.update_subscriber_config(session, &subscriber).await?;
        tracing::info!(
            company_id = %session.company_id,
            applications = ?subscriber.association.application_id,
            "Sales channel webhooks updated"
        );
        Ok(SyncOutcome::Updated { id: subscriber.id })
    }

    async fn existing_subscriber(
        &self,
        client: &dyn PlatformClient,
        session: &Session,
    ) -> Result<Option<SubscriberConfig>, WebhookError> {
        let mut subscribers = client
            .get_subscribers_by_extension_id(session, &self.extension_id)
            .await?;
        if subscribers.len() > 1 {
            tracing::warn!(
                company_id = %session.company_id,
                count = subscribers.len(),
                "Multiple webhook subscribers found, reconciling the first"
            );
        }
        Ok(if subscribers.is_empty() {
            None
        } else {
            Some(subscribers.swap_remove(0))
        })
    }

    /// Maps event-map keys to catalog ids, dropping keys the catalog lacks.
    fn resolve_event_ids(&self, catalog: &[EventConfig]) -> BTreeSet<u64> {
        self.config
            .event_map()
            .keys()
            .filter_map(|key| {
                let id = catalog
                    .iter()
                    .find(|event| event.key() == *key)
                    .map(|event| event.id);
                if id.is_none() {
                    tracing::debug!(event = %key, "Event not in platform catalog, skipping");
                }
                id
            })
            .collect()
    }

    fn new_subscriber(&self, company_id: &str, event_ids: &BTreeSet<u64>) -> SubscriberConfig {
        SubscriberConfig {
            id: None,
            name: self.extension_id.clone(),
            webhook_url: self.webhook_url.clone(),
            status: SubscriberStatus::Active,
            email_id: self.config.notification_email().to_string(),
            association: Association {
                company_id: company_id.to_string(),
                criteria: self.config.sales_channel().criteria(&[]),
                application_id: Vec::new(),
            },
            auth_meta: Some(AuthMeta::hmac(self.secret.clone())),
            event_id: event_ids.iter().copied().collect(),
            event_configs: Vec::new(),
        }
    }

    /// Brings `subscriber` in line with the configuration.
    ///
    /// Returns `true` if any field drifted.
    fn reconcile(&self, subscriber: &mut SubscriberConfig, event_ids: &BTreeSet<u64>) -> bool {
        let mut drifted = false;

        if subscriber.email_id != self.config.notification_email() {
            subscriber.email_id = self.config.notification_email().to_string();
            drifted = true;
        }

        if subscriber.webhook_url != self.webhook_url {
            subscriber.webhook_url.clone_from(&self.webhook_url);
            drifted = true;
        }

        let association = &mut subscriber.association;
        let criteria = self
            .config
            .sales_channel()
            .criteria(&association.application_id);
        if association.criteria != criteria {
            association.criteria = criteria;
            drifted = true;
        }
        if criteria == AssociationCriteria::All && !association.application_id.is_empty() {
            association.application_id.clear();
            drifted = true;
        }

        let secret_matches = subscriber
            .auth_meta
            .as_ref()
            .is_some_and(|meta| meta.secret == self.secret);
        if !secret_matches {
            subscriber.auth_meta = Some(AuthMeta::hmac(self.secret.clone()));
            drifted = true;
        }

        let current = subscriber.current_event_ids();
        if current.symmetric_difference(event_ids).next().is_some() {
            drifted = true;
        }
        subscriber.event_id = event_ids.iter().copied().collect();

        if drifted && subscriber.status == SubscriberStatus::Inactive {
            subscriber.status = SubscriberStatus::Active;
        }

        drifted
    }
}
