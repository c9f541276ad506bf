//! Signature verification of inbound webhook calls.
//!
//! The platform signs every delivery with HMAC-SHA256 over the raw request
//! body, keyed with the subscriber's shared secret, and sends the hex digest
//! in the [`HEADER_SIGNATURE`] header.
//!
//! - [`verify_webhook`]: verifies a [`WebhookRequest`] and parses it into a [`WebhookContext`]
//! - [`verify_signature`]: low-level check for custom integrations
//!
//! Events named `ping` skip verification so the platform's health check
//! succeeds before a secret is provisioned.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::auth::oauth::hmac::compute_signature;
//! use fp_extension::webhooks::{verify_webhook, WebhookRequest};
//!
//! let body = br#"{"event":{"name":"product","type":"create"},"company_id":1}"#;
//! let signature = compute_signature(body, "secret");
//!
//! let request = WebhookRequest::new(body.to_vec(), Some(signature));
//! let context = verify_webhook("secret", &request).unwrap();
//! assert_eq!(context.event_key(), "product/create");
//! assert_eq!(context.company_id(), "1");
//! ```
//!
//! # Security
//!
//! Signature comparison is constant-time.

use serde_json::Value;

use crate::auth::oauth::hmac::{compute_signature, constant_time_compare};
use crate::webhooks::types::event_key;
use crate::webhooks::WebhookError;

/// HTTP header carrying the hex HMAC-SHA256 of the body.
pub const HEADER_SIGNATURE: &str = "x-fp-signature";

/// Event name exempt from signature verification.
pub const PING_EVENT: &str = "ping";

// ============================================================================
// WebhookRequest
// ============================================================================

/// An inbound webhook call.
///
/// The body is kept as raw bytes so the signature is computed over exactly
/// what was received.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    body: Vec<u8>,
    signature: Option<String>,
}

impl WebhookRequest {
    /// Creates a request from the raw body and the [`HEADER_SIGNATURE`] value.
    #[must_use]
    pub const fn new(body: Vec<u8>, signature: Option<String>) -> Self {
        Self { body, signature }
    }

    /// Returns the raw request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the signature header value, if present.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }
}

// ============================================================================
// WebhookContext
// ============================================================================

/// A verified, parsed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookContext {
    event_name: String,
    event_type: String,
    company_id: String,
    application_id: Option<String>,
    body: Value,
}

impl WebhookContext {
    fn from_body(body: Value) -> Self {
        let event = body.get("event");
        let field = |name: &str| {
            event
                .and_then(|event| event.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            event_name: field("name"),
            event_type: field("type"),
            company_id: body.get("company_id").map(id_to_string).unwrap_or_default(),
            application_id: body
                .get("application_id")
                .map(id_to_string)
                .filter(|id| !id.is_empty()),
            body,
        }
    }

    /// The `event.name` field.
    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// The `event.type` field.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The `name/type` key the event is dispatched by.
    #[must_use]
    pub fn event_key(&self) -> String {
        event_key(&self.event_name, &self.event_type)
    }

    /// Tenant the event belongs to. Empty when the body has none.
    #[must_use]
    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    /// Sales channel the event belongs to, if any.
    #[must_use]
    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    /// The parsed JSON body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Returns `true` for the platform's health-check event.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.event_name == PING_EVENT
    }
}

fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Verification Functions
// ============================================================================

/// Returns `true` if `signature` is the hex HMAC-SHA256 of `raw_body` under `secret`.
///
/// # Example
///
/// ```rust
/// use fp_extension::auth::oauth::hmac::compute_signature;
/// use fp_extension::webhooks::verify_signature;
///
/// let signature = compute_signature(b"payload", "secret");
/// assert!(verify_signature(b"payload", &signature, "secret"));
/// assert!(!verify_signature(b"payload!", &signature, "secret"));
/// ```
#[must_use]
pub fn verify_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    let computed = compute_signature(raw_body, secret);
    constant_time_compare(&computed, signature)
}

/// Verifies a webhook request and returns its parsed context.
///
/// A body whose `event.name` is `ping` is accepted without a signature.
///
/// # Errors
///
/// Returns [`WebhookError::InvalidSignature`] if the signature header is
/// missing or does not match, and [`WebhookError::ProcessError`] if a
/// correctly signed body is not JSON.
pub fn verify_webhook(
    secret: &str,
    request: &WebhookRequest,
) -> Result<WebhookContext, WebhookError> {
    let parsed = serde_json::from_slice::<Value>(request.body()).ok();

    if let Some(body) = &parsed {
        let context = WebhookContext::from_body(body.clone());
        if context.is_ping() {
            return Ok(context);
        }
    }

    let verified = request
        .signature()
        .is_some_and(|signature| verify_signature(request.body(), signature, secret));
    if !verified {
        return Err(WebhookError::InvalidSignature);
    }

    parsed
        .map(WebhookContext::from_body)
        .ok_or_else(|| WebhookError::ProcessError {
            message: "webhook body is not valid JSON".to_string(),
        })
}
