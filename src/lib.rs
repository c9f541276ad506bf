//! # FP Extension Runtime
//!
//! Server-side runtime for platform extensions: the OAuth install flow,
//! session persistence over tiered storage, and webhook subscription sync
//! and verification.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`ExtensionConfig`] and [`ExtensionConfigBuilder`]
//! - Validated newtypes for API credentials and URLs
//! - Sessions with deterministic offline ids via [`auth`]
//! - The install, authorize, uninstall and auto-install flow via [`auth::oauth`]
//! - Cache plus durable session storage with TTLs via [`storage`]
//! - Webhook signature checks, dispatch and subscriber sync via [`webhooks`]
//! - An async HTTP client with retry logic for platform calls via [`clients`]
//!
//! ## Quick Start
//!
//! ```rust
//! use fp_extension::{AccessMode, ApiKey, ApiSecret, BaseUrl, ExtensionConfig};
//!
//! let config = ExtensionConfig::builder()
//!     .api_key(ApiKey::new("your-api-key").unwrap())
//!     .api_secret(ApiSecret::new("your-api-secret").unwrap())
//!     .base_url(BaseUrl::new("https://ext.example.com").unwrap())
//!     .scopes(["company/products", "company/orders"])
//!     .access_mode(AccessMode::Offline)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.auth_callback_url(), "https://ext.example.com/fp/auth");
//! ```
//!
//! ## Install Flow
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fp_extension::auth::oauth::OAuthFlow;
//! use fp_extension::context::RequestContext;
//! use fp_extension::storage::{MemoryStore, SqliteStore, TieredStore};
//!
//! let store = TieredStore::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SqliteStore::connect("sqlite://sessions.db").await?),
//! );
//! let flow = OAuthFlow::from_config(config, Arc::new(store), Arc::new(callbacks));
//!
//! // GET /fp/install?company_id=1
//! let install = flow.install(&RequestContext::from_query_string(query)).await?;
//!
//! // GET /fp/auth?company_id=1&code=...&state=...
//! let context = RequestContext::from_query_string(query).with_cookie_header(cookie);
//! let authorized = flow.authorize(&context, &code, &state).await?;
//! ```
//!
//! ## Webhooks
//!
//! ```rust,ignore
//! use fp_extension::webhooks::{WebhookRegistry, WebhookRequest};
//!
//! let request = WebhookRequest::new(body, headers.get("x-fp-signature"));
//! registry.process(config.api_secret().as_ref(), &request).await?;
//! ```
//!
//! ## Errors
//!
//! Every module has its own error enum. [`ExtensionError`] wraps them and
//! maps each to an HTTP status and a `{success: false, error}` body.
//!
//! ## Design Principles
//!
//! - **No global state**: configuration, stores and callbacks are passed explicitly
//! - **Fail-fast validation**: all newtypes validate on construction
//! - **Thread-safe**: all types are `Send + Sync`
//! - **Async-first**: designed for the Tokio runtime

pub mod auth;
pub mod clients;
pub mod config;
pub mod context;
pub mod error;
pub mod storage;
pub mod webhooks;

// Re-export public types at crate root for convenience
pub use auth::{AccessMode, AccessToken, Session, SessionRegistry};
pub use config::{ApiKey, ApiSecret, BaseUrl, ExtensionConfig, ExtensionConfigBuilder, RetryPolicy};
pub use error::{ConfigError, ErrorEnvelope, ExtensionError};

// Re-export the install flow entry points
pub use auth::oauth::{ExtensionCallbacks, OAuthError, OAuthFlow};
pub use context::RequestContext;
