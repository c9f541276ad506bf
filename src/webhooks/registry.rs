//! Handler registry and inbound webhook dispatch.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::webhooks::{
//!     BoxFuture, WebhookConfig, WebhookContext, WebhookError, WebhookHandler, WebhookRegistry,
//! };
//!
//! struct LogHandler;
//!
//! impl WebhookHandler for LogHandler {
//!     fn handle<'a>(&'a self, _context: WebhookContext) -> BoxFuture<'a, Result<(), WebhookError>> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//!
//! let config = WebhookConfig::builder()
//!     .api_path("/webhooks")
//!     .notification_email("ops@example.com")
//!     .event("product/create", "log")
//!     .build()
//!     .unwrap();
//!
//! let mut registry = WebhookRegistry::new(config);
//! registry.add_handler("log", LogHandler);
//! assert!(registry.validate().is_ok());
//! ```

use std::collections::HashMap;

use super::errors::WebhookError;
use super::types::{WebhookConfig, WebhookHandler};
use super::verification::{verify_webhook, WebhookRequest};

/// Declared webhook configuration plus the named handlers it refers to.
///
/// # Thread Safety
///
/// `WebhookRegistry` is `Send + Sync`, so one instance can serve every
/// inbound request.
pub struct WebhookRegistry {
    config: WebhookConfig,
    handlers: HashMap<String, Box<dyn WebhookHandler>>,
}

impl std::fmt::Debug for WebhookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRegistry")
            .field("config", &self.config)
            .field("handlers", &format!("<{} handlers>", self.handlers.len()))
            .finish()
    }
}

// Verify WebhookRegistry is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WebhookRegistry>();
};

impl WebhookRegistry {
    /// Creates a registry without handlers.
    #[must_use]
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` under `name`, replacing any previous one.
    pub fn add_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl WebhookHandler + 'static,
    ) -> &mut Self {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// The declared configuration.
    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Returns `true` if a handler is registered under `name`.
    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Checks that every event in the map names a registered handler.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidConfig`] naming the first event whose
    /// handler is missing.
    pub fn validate(&self) -> Result<(), WebhookError> {
        for (event, handler) in self.config.event_map() {
            if !self.handlers.contains_key(handler) {
                return Err(WebhookError::invalid_config(format!(
                    "handler '{handler}' for event '{event}' is not registered"
                )));
            }
        }
        Ok(())
    }

    /// Handler mapped to the `name/type` event key.
    fn handler_for(&self, event_key: &str) -> Option<&dyn WebhookHandler> {
        let name = self.config.event_map().get(event_key)?;
        self.handlers.get(name).map(AsRef::as_ref)
    }

    /// Verifies and dispatches one inbound webhook call.
    ///
    /// `ping` events succeed without a signature or a handler.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidSignature`] if verification fails,
    /// [`WebhookError::HandlerNotFound`] if no handler is mapped to the event
    /// and [`WebhookError::ProcessError`] if the handler fails.
    pub async fn process(&self, secret: &str, request: &WebhookRequest) -> Result<(), WebhookError> {
        let context = verify_webhook(secret, request)?;

        if context.is_ping() {
            tracing::debug!(company_id = %context.company_id(), "Webhook ping received");
            return Ok(());
        }

        let event = context.event_key();
        let handler = self
            .handler_for(&event)
            .ok_or_else(|| WebhookError::HandlerNotFound {
                event: event.clone(),
            })?;

        tracing::debug!(
            event = %event,
            company_id = %context.company_id(),
            "Dispatching webhook"
        );

        handler.handle(context).await.map_err(|error| {
            tracing::error!(event = %event, error = %error, "Webhook handler failed");
            match error {
                WebhookError::ProcessError { .. } => error,
                other => WebhookError::ProcessError {
                    message: other.to_string(),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::hmac::compute_signature;
    use crate::webhooks::types::BoxFuture;
    use crate::webhooks::verification::WebhookContext;
    use std::sync::{Arc, Mutex};

    const SECRET: &str = "whsec";

    // Records every context it is invoked with
    struct RecordingHandler {
        seen: Arc<Mutex<Vec<WebhookContext>>>,
    }

    impl WebhookHandler for RecordingHandler {
        fn handle<'a>(
            &'a self,
            context: WebhookContext,
        ) -> BoxFuture<'a, Result<(), WebhookError>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(context);
                Ok(())
            })
        }
    }

    // Error handler implementation for testing error propagation
    struct FailingHandler;

    impl WebhookHandler for FailingHandler {
        fn handle<'a>(
            &'a self,
            _context: WebhookContext,
        ) -> BoxFuture<'a, Result<(), WebhookError>> {
            Box::pin(async {
                Err(WebhookError::HandlerNotFound {
                    event: "nested".to_string(),
                })
            })
        }
    }

    fn registry() -> (WebhookRegistry, Arc<Mutex<Vec<WebhookContext>>>) {
        let config = WebhookConfig::builder()
            .api_path("/webhooks")
            .notification_email("ops@example.com")
            .event("product/create", "products")
            .event("order/placed", "failing")
            .build()
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = WebhookRegistry::new(config);
        registry
            .add_handler("products", RecordingHandler { seen: seen.clone() })
            .add_handler("failing", FailingHandler);
        (registry, seen)
    }

    fn signed(body: &str) -> WebhookRequest {
        WebhookRequest::new(
            body.as_bytes().to_vec(),
            Some(compute_signature(body.as_bytes(), SECRET)),
        )
    }

    // ========================================================================
    // validate
    // ========================================================================

    #[test]
    fn test_validate_passes_when_all_handlers_registered() {
        let (registry, _) = registry();
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_validate_fails_on_unregistered_handler() {
        let config = WebhookConfig::builder()
            .api_path("/webhooks")
            .notification_email("ops@example.com")
            .event("product/create", "missing")
            .build()
            .unwrap();
        let registry = WebhookRegistry::new(config);

        match registry.validate() {
            Err(WebhookError::InvalidConfig { reason }) => assert!(reason.contains("missing")),
            other => panic!("unexpected {other:?}"),
        }
    }

    // ========================================================================
    // process
    // ========================================================================

    #[tokio::test]
    async fn test_process_dispatches_to_mapped_handler() {
        let (registry, seen) = registry();
        let body = r#"{"event":{"name":"product","type":"create"},"company_id":1,"application_id":"app"}"#;

        registry.process(SECRET, &signed(body)).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_key(), "product/create");
        assert_eq!(seen[0].company_id(), "1");
        assert_eq!(seen[0].application_id(), Some("app"));
        assert_eq!(seen[0].body()["company_id"], 1);
    }

    #[tokio::test]
    async fn test_process_rejects_invalid_signature() {
        let (registry, seen) = registry();
        let body = r#"{"event":{"name":"product","type":"create"}}"#;
        let request = WebhookRequest::new(body.as_bytes().to_vec(), Some("bad".to_string()));

        let result = registry.process(SECRET, &request).await;
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_unknown_event_is_handler_not_found() {
        let (registry, _) = registry();
        let body = r#"{"event":{"name":"product","type":"delete"}}"#;

        match registry.process(SECRET, &signed(body)).await {
            Err(WebhookError::HandlerNotFound { event }) => assert_eq!(event, "product/delete"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_wraps_handler_errors() {
        let (registry, _) = registry();
        let body = r#"{"event":{"name":"order","type":"placed"}}"#;

        let result = registry.process(SECRET, &signed(body)).await;
        assert!(matches!(result, Err(WebhookError::ProcessError { .. })));
    }

    #[tokio::test]
    async fn test_process_ping_always_succeeds() {
        let (registry, seen) = registry();
        let request = WebhookRequest::new(br#"{"event":{"name":"ping"}}"#.to_vec(), None);

        registry.process(SECRET, &request).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_debug_hides_handlers() {
        let (registry, _) = registry();
        let debug = format!("{registry:?}");
        assert!(debug.contains("<2 handlers>"));
    }
}
