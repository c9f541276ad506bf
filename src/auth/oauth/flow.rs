//! Install flow coordinator.
//!
//! [`OAuthFlow`] drives a tenant through
//! `InstallRequested → RedirectedToAuthorize → CallbackReceived →
//! TokenExchanged → SessionCommitted`, or into `Failed`:
//!
//! 1. [`install`](OAuthFlow::install) creates an online session with a
//!    state nonce and redirects the browser to the platform's consent page.
//! 2. [`authorize`](OAuthFlow::authorize) checks the echoed state, exchanges
//!    the code and commits the session. In offline mode it also commits the
//!    tenant's canonical offline session. The webhook subscriber is synced
//!    afterwards on a best-effort basis.
//! 3. [`uninstall`](OAuthFlow::uninstall) removes the tenant's offline session.
//! 4. [`auto_install`](OAuthFlow::auto_install) is the browser-less variant of
//!    the offline branch.
//!
//! # Concurrency
//!
//! Nothing serializes two flows for the same tenant. Concurrent authorizes
//! race on the offline session record and the last save wins.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::auth::identity::{new_offline_id, new_online_id};
use crate::auth::oauth::callbacks::{CallbackContext, ExtensionCallbacks};
use crate::auth::oauth::client::{AuthorizationRequest, OAuthClient, PlatformOAuthClient};
use crate::auth::oauth::cookie::SessionCookie;
use crate::auth::oauth::error::OAuthError;
use crate::auth::oauth::state::StateParam;
use crate::auth::{AccessMode, AccessToken, Session, SessionRegistry};
use crate::clients::PlatformClient;
use crate::config::ExtensionConfig;
use crate::context::RequestContext;
use crate::storage::KeyValueStore;
use crate::webhooks::{SyncOutcome, WebhookSyncEngine};

/// Response header echoing the resolved tenant id.
pub const HEADER_COMPANY_ID: &str = "x-company-id";

/// Stages of the install flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowStage {
    /// `install` was called.
    InstallRequested,
    /// The browser was sent to the consent page.
    RedirectedToAuthorize,
    /// The platform redirected back with `code` and `state`.
    CallbackReceived,
    /// The code was exchanged for a token.
    TokenExchanged,
    /// The session was persisted.
    SessionCommitted,
    /// The flow stopped with an error.
    Failed,
}

impl FlowStage {
    /// Returns the snake_case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstallRequested => "install_requested",
            Self::RedirectedToAuthorize => "redirected_to_authorize",
            Self::CallbackReceived => "callback_received",
            Self::TokenExchanged => "token_exchanged",
            Self::SessionCommitted => "session_committed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session whose authorization code has been exchanged.
///
/// [`OAuthFlow::commit`] only accepts this type, so a session cannot be
/// committed by authorize before its token exchange.
struct ExchangedSession(Session);

impl ExchangedSession {
    fn new(mut session: Session, token: &AccessToken) -> Self {
        session.update_token(token);
        Self(session)
    }
}

/// Result of [`OAuthFlow::install`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallResponse {
    redirect_url: String,
    cookie: SessionCookie,
    company_id: String,
}

impl InstallResponse {
    /// The platform consent URL.
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// The session cookie to set.
    #[must_use]
    pub const fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    /// The resolved tenant id.
    #[must_use]
    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    /// The id of the install-time session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.cookie.session_id()
    }

    /// Always [`FlowStage::RedirectedToAuthorize`].
    #[must_use]
    pub const fn stage(&self) -> FlowStage {
        FlowStage::RedirectedToAuthorize
    }

    /// `Location`, `Set-Cookie` and `x-company-id` response headers.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Location", self.redirect_url.clone()),
            ("Set-Cookie", self.cookie.to_string()),
            (HEADER_COMPANY_ID, self.company_id.clone()),
        ]
    }
}

/// Result of [`OAuthFlow::authorize`].
#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizeResponse {
    redirect_url: String,
    session: Session,
    offline_session: Option<Session>,
    webhook_sync: Option<SyncOutcome>,
}

impl AuthorizeResponse {
    /// Where the `auth` callback sends the browser.
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// The committed online session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The committed offline session, in offline mode.
    #[must_use]
    pub const fn offline_session(&self) -> Option<&Session> {
        self.offline_session.as_ref()
    }

    /// Outcome of the webhook sync, if one ran and succeeded.
    #[must_use]
    pub const fn webhook_sync(&self) -> Option<SyncOutcome> {
        self.webhook_sync
    }

    /// Always [`FlowStage::SessionCommitted`].
    #[must_use]
    pub const fn stage(&self) -> FlowStage {
        FlowStage::SessionCommitted
    }

    /// `Location` and `x-company-id` response headers.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Location", self.redirect_url.clone()),
            (HEADER_COMPANY_ID, self.session.company_id.clone()),
        ]
    }
}

struct WebhookSync {
    engine: WebhookSyncEngine,
    client: Arc<dyn PlatformClient>,
}

/// Coordinates install, authorize, uninstall and auto-install.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use fp_extension::auth::oauth::OAuthFlow;
/// use fp_extension::context::RequestContext;
/// use fp_extension::storage::MemoryStore;
///
/// let flow = OAuthFlow::from_config(config, Arc::new(MemoryStore::new()), Arc::new(callbacks));
///
/// // GET /fp/install?company_id=1
/// let install = flow.install(&RequestContext::from_query_string(query)).await?;
/// for (name, value) in install.headers() {
///     response.header(name, value);
/// }
///
/// // GET /fp/auth?company_id=1&code=...&state=...
/// let context = RequestContext::from_query_string(query).with_cookie_header(cookie);
/// let authorized = flow.authorize(&context, code, state).await?;
/// ```
pub struct OAuthFlow {
    config: ExtensionConfig,
    registry: SessionRegistry,
    oauth_client: Arc<dyn OAuthClient>,
    callbacks: Arc<dyn ExtensionCallbacks>,
    webhooks: Option<WebhookSync>,
}

impl fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("config", &self.config)
            .field("webhook_sync", &self.webhooks.is_some())
            .finish_non_exhaustive()
    }
}

// Verify OAuthFlow is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthFlow>();
};

impl OAuthFlow {
    /// Creates a coordinator from its collaborators.
    #[must_use]
    pub fn new(
        config: ExtensionConfig,
        registry: SessionRegistry,
        oauth_client: Arc<dyn OAuthClient>,
        callbacks: Arc<dyn ExtensionCallbacks>,
    ) -> Self {
        Self {
            config,
            registry,
            oauth_client,
            callbacks,
            webhooks: None,
        }
    }

    /// Creates a coordinator talking to the configured cluster.
    #[must_use]
    pub fn from_config(
        config: ExtensionConfig,
        store: Arc<dyn KeyValueStore>,
        callbacks: Arc<dyn ExtensionCallbacks>,
    ) -> Self {
        let oauth_client = Arc::new(PlatformOAuthClient::from_config(&config));
        Self::new(config, SessionRegistry::new(store), oauth_client, callbacks)
    }

    /// Syncs the webhook subscriber through `client` after installs.
    #[must_use]
    pub fn with_webhook_sync(
        mut self,
        engine: WebhookSyncEngine,
        client: Arc<dyn PlatformClient>,
    ) -> Self {
        self.webhooks = Some(WebhookSync { engine, client });
        self
    }

    /// The extension configuration.
    #[must_use]
    pub const fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    /// The session registry the flow writes to.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Starts an install for the request's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidInput`] without a company id,
    /// [`OAuthError::Storage`] if the session cannot be saved and
    /// [`OAuthError::Callback`] if the `install` callback fails.
    pub async fn install(&self, context: &RequestContext) -> Result<InstallResponse, OAuthError> {
        self.run_install(context)
            .await
            .map_err(|error| failed("install", context, error))
    }

    /// Completes an install from the platform's redirect.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::SessionNotFound`] if the cookie names no live
    /// session, [`OAuthError::InvalidOAuth`] on a state mismatch, and the
    /// token exchange, storage or callback error otherwise. A failed webhook
    /// sync is logged and does not fail the call.
    pub async fn authorize(
        &self,
        context: &RequestContext,
        code: &str,
        state: &str,
    ) -> Result<AuthorizeResponse, OAuthError> {
        self.run_authorize(context, code, state)
            .await
            .map_err(|error| failed("authorize", context, error))
    }

    /// Removes the tenant's offline session and runs the `uninstall` callback.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidInput`] without a company id,
    /// [`OAuthError::Storage`] if the delete fails and
    /// [`OAuthError::Callback`] if the callback fails. The delete is not
    /// rolled back when the callback fails.
    pub async fn uninstall(&self, context: &RequestContext) -> Result<(), OAuthError> {
        self.run_uninstall(context)
            .await
            .map_err(|error| failed("uninstall", context, error))
    }

    /// Installs without a browser redirect, committing only the offline session.
    ///
    /// # Errors
    ///
    /// Same as the offline branch of [`authorize`](Self::authorize).
    pub async fn auto_install(
        &self,
        context: &RequestContext,
        code: &str,
    ) -> Result<Session, OAuthError> {
        self.run_auto_install(context, code)
            .await
            .map_err(|error| failed("auto_install", context, error))
    }

    async fn run_install(&self, context: &RequestContext) -> Result<InstallResponse, OAuthError> {
        let company_id = require_company_id(context)?;
        tracing::debug!(stage = %FlowStage::InstallRequested, company_id, "Install requested");

        let state = StateParam::new();
        let mut session = Session::new(new_online_id(), company_id, self.config.api_key().as_ref());
        session.scope = self.config.scopes().to_vec();
        session.access_mode = AccessMode::Online;
        session.state = Some(state.as_ref().to_string());
        session.expires = chrono::Duration::from_std(self.config.install_session_ttl())
            .ok()
            .map(|ttl| Utc::now() + ttl);

        let redirect_url = self.oauth_client.authorization_url(&AuthorizationRequest {
            company_id: company_id.to_string(),
            scopes: session.scope.clone(),
            redirect_uri: self.callback_url(context),
            state: state.into_inner(),
            access_mode: AccessMode::Online,
        })?;

        self.registry.save(&session).await?;

        let max_age = session.ttl_seconds(Utc::now()).unwrap_or(0);
        let cookie = SessionCookie::new(company_id, session.id.clone(), max_age);

        self.callbacks
            .install(&callback_context(context, company_id, Some(session)))
            .await
            .map_err(OAuthError::callback)?;

        tracing::info!(
            stage = %FlowStage::RedirectedToAuthorize,
            company_id,
            session_id = %cookie.session_id(),
            "Redirecting to authorize"
        );

        Ok(InstallResponse {
            redirect_url,
            cookie,
            company_id: company_id.to_string(),
        })
    }

    async fn run_authorize(
        &self,
        context: &RequestContext,
        code: &str,
        state: &str,
    ) -> Result<AuthorizeResponse, OAuthError> {
        let company_id = require_company_id(context)?;
        let session_id = context.session_id().unwrap_or_default();
        tracing::debug!(
            stage = %FlowStage::CallbackReceived,
            company_id,
            session_id = %session_id,
            "Authorize callback received"
        );

        let session = match self.registry.get(&session_id).await {
            Some(session) if !session_id.is_empty() => session,
            _ => return Err(OAuthError::SessionNotFound { session_id }),
        };

        let state_matches = session
            .state
            .as_deref()
            .is_some_and(|stored| StateParam::from_raw(stored).matches(state));
        if !state_matches {
            return Err(OAuthError::InvalidOAuth);
        }
        require_code(code)?;

        let token = self.oauth_client.verify_callback(company_id, code).await?;
        let mut exchanged = ExchangedSession::new(session, &token);
        if exchanged.0.access_token_validity.is_some() {
            exchanged.0.expires = exchanged.0.access_token_validity;
        }
        exchanged.0.access_mode = AccessMode::Online;
        tracing::debug!(stage = %FlowStage::TokenExchanged, company_id, "Online token exchanged");
        let session = self.commit(exchanged).await?;

        let offline_session = if self.config.is_offline_mode() {
            let offline = self.load_offline_session(company_id).await;
            let exchanged = self.exchange_offline(offline, company_id, code).await?;
            Some(self.commit(exchanged).await?)
        } else {
            None
        };

        let sync_session = offline_session.as_ref().unwrap_or(&session);
        let webhook_sync = self.sync_webhooks(sync_session).await;

        let redirect_url = self
            .callbacks
            .auth(&callback_context(context, company_id, Some(session.clone())))
            .await
            .map_err(OAuthError::callback)?;

        Ok(AuthorizeResponse {
            redirect_url,
            session,
            offline_session,
            webhook_sync,
        })
    }

    async fn run_uninstall(&self, context: &RequestContext) -> Result<(), OAuthError> {
        let company_id = require_company_id(context)?;

        let removed = if self.config.is_offline_mode() {
            let session_id = self.offline_session_id(company_id);
            let removed = self.registry.get(&session_id).await;
            self.registry.delete(&session_id).await?;
            tracing::info!(company_id, session_id = %session_id, "Offline session deleted");
            removed
        } else {
            None
        };

        self.callbacks
            .uninstall(&callback_context(context, company_id, removed))
            .await
            .map_err(OAuthError::callback)
    }

    async fn run_auto_install(
        &self,
        context: &RequestContext,
        code: &str,
    ) -> Result<Session, OAuthError> {
        let company_id = require_company_id(context)?;
        require_code(code)?;

        let offline = self.load_offline_session(company_id).await;
        let exchanged = self.exchange_offline(offline, company_id, code).await?;
        let session = self.commit(exchanged).await?;

        self.callbacks
            .auto_install(&callback_context(context, company_id, Some(session.clone())))
            .await
            .map_err(OAuthError::callback)?;

        self.sync_webhooks(&session).await;
        Ok(session)
    }

    /// Persists an exchanged session.
    async fn commit(&self, exchanged: ExchangedSession) -> Result<Session, OAuthError> {
        let session = exchanged.0;
        self.registry.save(&session).await?;
        tracing::info!(
            stage = %FlowStage::SessionCommitted,
            company_id = %session.company_id,
            session_id = %session.id,
            access_mode = %session.access_mode,
            "Session committed"
        );
        Ok(session)
    }

    fn offline_session_id(&self, company_id: &str) -> String {
        new_offline_id(self.config.cluster().as_ref(), company_id)
    }

    /// Loads the tenant's canonical offline session, or starts a fresh one
    /// when none exists or the stored one belongs to another extension.
    async fn load_offline_session(&self, company_id: &str) -> Session {
        let session_id = self.offline_session_id(company_id);
        let extension_id = self.config.api_key().as_ref();

        let mut session = match self.registry.get(&session_id).await {
            Some(session) if session.extension_id == extension_id => session,
            Some(_) => {
                tracing::debug!(
                    company_id,
                    session_id = %session_id,
                    "Discarding offline session of another extension"
                );
                Session::new(session_id, company_id, extension_id)
            }
            None => Session::new(session_id, company_id, extension_id),
        };
        session.scope = self.config.scopes().to_vec();
        session.access_mode = AccessMode::Offline;
        session
    }

    async fn exchange_offline(
        &self,
        session: Session,
        company_id: &str,
        code: &str,
    ) -> Result<ExchangedSession, OAuthError> {
        let token = self
            .oauth_client
            .offline_access_token(company_id, &session.scope, code)
            .await?;
        let mut exchanged = ExchangedSession::new(session, &token);
        exchanged.0.access_mode = AccessMode::Offline;
        exchanged.0.expires = None;
        exchanged.0.state = None;
        tracing::debug!(stage = %FlowStage::TokenExchanged, company_id, "Offline token exchanged");
        Ok(exchanged)
    }

    /// Runs the webhook sync if configured. Failures are logged only.
    async fn sync_webhooks(&self, session: &Session) -> Option<SyncOutcome> {
        let sync = self.webhooks.as_ref()?;
        if !sync.engine.config().subscribe_on_install() {
            return None;
        }

        match sync.engine.sync_events(sync.client.as_ref(), session).await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                tracing::warn!(
                    company_id = %session.company_id,
                    error = %error,
                    "Webhook sync after install failed"
                );
                None
            }
        }
    }

    fn callback_url(&self, context: &RequestContext) -> String {
        let url = self.config.auth_callback_url();
        match context.application_id() {
            Some(application_id) => {
                format!("{url}?application_id={}", urlencoding::encode(application_id))
            }
            None => url,
        }
    }
}

/// The tenant id ends up in URL paths, cookie names and headers, so only
/// ASCII alphanumerics, `-` and `_` are accepted.
fn require_company_id(context: &RequestContext) -> Result<&str, OAuthError> {
    context
        .company_id()
        .filter(|id| is_valid_company_id(id))
        .ok_or_else(OAuthError::invalid_company_id)
}

fn is_valid_company_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn require_code(code: &str) -> Result<(), OAuthError> {
    if code.trim().is_empty() {
        return Err(OAuthError::InvalidInput {
            reason: "Missing authorization code".to_string(),
        });
    }
    Ok(())
}

fn callback_context(
    context: &RequestContext,
    company_id: &str,
    session: Option<Session>,
) -> CallbackContext {
    CallbackContext {
        company_id: company_id.to_string(),
        application_id: context.application_id().map(String::from),
        session,
    }
}

fn failed(operation: &'static str, context: &RequestContext, error: OAuthError) -> OAuthError {
    tracing::warn!(
        stage = %FlowStage::Failed,
        operation,
        company_id = context.company_id().unwrap_or_default(),
        error = %error,
        "OAuth flow failed"
    );
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::callbacks::CallbackError;
    use crate::clients::HttpError;
    use crate::config::{ApiKey, ApiSecret, BaseUrl};
    use crate::error::ExtensionError;
    use crate::storage::MemoryStore;
    use crate::webhooks::{EventConfig, SubscriberConfig, WebhookConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    // Token endpoint stub that remembers the codes it exchanged
    #[derive(Default)]
    struct StubOAuth {
        exchanged: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OAuthClient for StubOAuth {
        fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, OAuthError> {
            Ok(format!(
                "https://auth.example.com/authorize?state={}&redirect_uri={}",
                request.state, request.redirect_uri
            ))
        }

        async fn verify_callback(
            &self,
            _company_id: &str,
            code: &str,
        ) -> Result<AccessToken, OAuthError> {
            self.exchanged.lock().unwrap().push(format!("online:{code}"));
            Ok(AccessToken {
                access_token: format!("online-{code}"),
                expires_in: Some(3600),
                access_mode: Some(AccessMode::Online),
                ..AccessToken::default()
            })
        }

        async fn offline_access_token(
            &self,
            _company_id: &str,
            _scopes: &[String],
            code: &str,
        ) -> Result<AccessToken, OAuthError> {
            self.exchanged.lock().unwrap().push(format!("offline:{code}"));
            Ok(AccessToken {
                access_token: format!("offline-{code}"),
                refresh_token: Some("refresh".to_string()),
                access_mode: Some(AccessMode::Offline),
                ..AccessToken::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        calls: Mutex<Vec<(&'static str, CallbackContext)>>,
        fail_uninstall: AtomicBool,
    }

    #[async_trait]
    impl ExtensionCallbacks for RecordingCallbacks {
        async fn auth(&self, context: &CallbackContext) -> Result<String, CallbackError> {
            self.calls.lock().unwrap().push(("auth", context.clone()));
            Ok(format!("https://ext.example.com/company/{}", context.company_id))
        }

        async fn install(&self, context: &CallbackContext) -> Result<(), CallbackError> {
            self.calls.lock().unwrap().push(("install", context.clone()));
            Ok(())
        }

        async fn uninstall(&self, context: &CallbackContext) -> Result<(), CallbackError> {
            self.calls.lock().unwrap().push(("uninstall", context.clone()));
            if self.fail_uninstall.load(Ordering::SeqCst) {
                return Err("uninstall hook down".into());
            }
            Ok(())
        }

        async fn auto_install(&self, context: &CallbackContext) -> Result<(), CallbackError> {
            self.calls
                .lock()
                .unwrap()
                .push(("auto_install", context.clone()));
            Ok(())
        }
    }

    // Platform whose every call fails
    struct DownPlatform;

    #[async_trait]
    impl PlatformClient for DownPlatform {
        async fn fetch_all_event_configurations(
            &self,
            _session: &Session,
        ) -> Result<Vec<EventConfig>, HttpError> {
            Err(HttpError::InvalidResponse {
                message: "down".to_string(),
            })
        }

        async fn get_subscribers_by_extension_id(
            &self,
            _session: &Session,
            _extension_id: &str,
        ) -> Result<Vec<SubscriberConfig>, HttpError> {
            Ok(Vec::new())
        }

        async fn register_subscriber_to_event(
            &self,
            _session: &Session,
            subscriber: &SubscriberConfig,
        ) -> Result<SubscriberConfig, HttpError> {
            Ok(subscriber.clone())
        }

        async fn update_subscriber_config(
            &self,
            _session: &Session,
            subscriber: &SubscriberConfig,
        ) -> Result<SubscriberConfig, HttpError> {
            Ok(subscriber.clone())
        }
    }

    struct Harness {
        flow: OAuthFlow,
        oauth: Arc<StubOAuth>,
        callbacks: Arc<RecordingCallbacks>,
    }

    fn config(mode: AccessMode) -> ExtensionConfig {
        ExtensionConfig::builder()
            .api_key(ApiKey::new("ext-key").unwrap())
            .api_secret(ApiSecret::new("ext-secret").unwrap())
            .base_url(BaseUrl::new("https://ext.example.com").unwrap())
            .scopes(["company/products"])
            .access_mode(mode)
            .build()
            .unwrap()
    }

    fn harness(mode: AccessMode) -> Harness {
        let oauth = Arc::new(StubOAuth::default());
        let callbacks = Arc::new(RecordingCallbacks::default());
        let flow = OAuthFlow::new(
            config(mode),
            SessionRegistry::new(Arc::new(MemoryStore::new())),
            oauth.clone(),
            callbacks.clone(),
        );
        Harness {
            flow,
            oauth,
            callbacks,
        }
    }

    fn cookie_context(install: &InstallResponse) -> RequestContext {
        RequestContext::new(install.company_id())
            .with_cookie_header(format!("{}={}", install.cookie().name(), install.session_id()))
    }

    async fn stored_state(flow: &OAuthFlow, session_id: &str) -> String {
        flow.registry()
            .get(session_id)
            .await
            .unwrap()
            .state
            .unwrap()
    }

    // ========================================================================
    // install
    // ========================================================================

    #[tokio::test]
    async fn test_install_without_company_is_invalid_input() {
        let h = harness(AccessMode::Online);

        let error = h.flow.install(&RequestContext::new("")).await.unwrap_err();
        let error = ExtensionError::from(error);
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.envelope().error, "Invalid company id");

        let error = h.flow.install(&RequestContext::default()).await.unwrap_err();
        assert!(matches!(error, OAuthError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_company_id_with_unsafe_characters_is_rejected() {
        let h = harness(AccessMode::Online);

        for company_id in ["1/../2", "T1; Path=/", "T1\r\nX-Injected: 1", "T 1", " "] {
            let error = h
                .flow
                .install(&RequestContext::new(company_id))
                .await
                .unwrap_err();
            assert!(
                matches!(error, OAuthError::InvalidInput { .. }),
                "{company_id:?} should be rejected"
            );
        }

        assert!(h.flow.install(&RequestContext::new("T-1_a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_install_creates_session_and_cookie() {
        let h = harness(AccessMode::Online);

        let install = h.flow.install(&RequestContext::new("T1")).await.unwrap();

        assert_eq!(install.stage(), FlowStage::RedirectedToAuthorize);
        assert_eq!(install.cookie().name(), "ext_session_T1");
        assert!(install.cookie().max_age() > 0 && install.cookie().max_age() <= 900);

        let session = h.flow.registry().get(install.session_id()).await.unwrap();
        assert_eq!(session.company_id, "T1");
        assert_eq!(session.extension_id, "ext-key");
        assert_eq!(session.scope, ["company/products"]);
        assert_eq!(session.access_mode, AccessMode::Online);
        assert!(session.access_token.is_none());
        let state = session.state.unwrap();
        assert!(install.redirect_url().contains(&format!("state={state}")));

        let headers = install.headers();
        assert!(headers.contains(&(HEADER_COMPANY_ID, "T1".to_string())));
        assert!(headers
            .iter()
            .any(|(name, value)| *name == "Set-Cookie" && value.starts_with("ext_session_T1=")));

        let calls = h.callbacks.calls.lock().unwrap();
        assert_eq!(calls[0].0, "install");
    }

    #[tokio::test]
    async fn test_each_install_gets_a_fresh_session_id() {
        let h = harness(AccessMode::Online);
        let first = h.flow.install(&RequestContext::new("T1")).await.unwrap();
        let second = h.flow.install(&RequestContext::new("T1")).await.unwrap();
        assert_ne!(first.session_id(), second.session_id());
    }

    #[tokio::test]
    async fn test_install_passes_application_id_to_redirect_uri() {
        let h = harness(AccessMode::Online);
        let context = RequestContext::new("T1").with_application_id("app 1");

        let install = h.flow.install(&context).await.unwrap();
        assert!(install
            .redirect_url()
            .contains("redirect_uri=https://ext.example.com/fp/auth?application_id=app%201"));
    }

    // ========================================================================
    // authorize
    // ========================================================================

    #[tokio::test]
    async fn test_authorize_without_session_is_not_found() {
        let h = harness(AccessMode::Online);

        let error = h
            .flow
            .authorize(&RequestContext::new("T1"), "code", "state")
            .await
            .unwrap_err();
        assert!(matches!(error, OAuthError::SessionNotFound { .. }));
        assert_eq!(ExtensionError::from(error).status_code(), 401);
    }

    #[tokio::test]
    async fn test_authorize_with_mismatched_state_is_invalid_oauth() {
        let h = harness(AccessMode::Online);
        let install = h.flow.install(&RequestContext::new("T1")).await.unwrap();

        let error = h
            .flow
            .authorize(&cookie_context(&install), "code", "forged")
            .await
            .unwrap_err();
        assert!(matches!(error, OAuthError::InvalidOAuth));

        let error = ExtensionError::from(error);
        assert_eq!(error.status_code(), 500);
        let body = serde_json::to_value(error.envelope()).unwrap();
        assert_eq!(body["success"], false);

        assert!(h.oauth.exchanged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_commits_online_session() {
        let h = harness(AccessMode::Online);
        let install = h.flow.install(&RequestContext::new("T1")).await.unwrap();
        let state = stored_state(&h.flow, install.session_id()).await;

        let authorized = h
            .flow
            .authorize(&cookie_context(&install), "c1", &state.to_uppercase())
            .await
            .unwrap();

        assert_eq!(authorized.stage(), FlowStage::SessionCommitted);
        assert_eq!(authorized.redirect_url(), "https://ext.example.com/company/T1");
        assert!(authorized.offline_session().is_none());
        assert!(authorized.webhook_sync().is_none());

        let stored = h.flow.registry().get(install.session_id()).await.unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("online-c1"));
        assert!(!stored.is_new);
        assert!(stored.expires.is_some());
        assert_eq!(*h.oauth.exchanged.lock().unwrap(), ["online:c1"]);
    }

    #[tokio::test]
    async fn test_offline_authorize_commits_two_sessions() {
        let h = harness(AccessMode::Offline);
        let install = h.flow.install(&RequestContext::new("T1")).await.unwrap();
        let state = stored_state(&h.flow, install.session_id()).await;

        let authorized = h
            .flow
            .authorize(&cookie_context(&install), "c1", &state)
            .await
            .unwrap();

        let offline = authorized.offline_session().unwrap();
        assert_eq!(
            offline.id,
            new_offline_id("https://api.fynd.com", "T1")
        );
        assert_ne!(offline.id, authorized.session().id);

        let stored = h
            .flow
            .registry()
            .get_by_tenant("T1", "https://api.fynd.com")
            .await
            .unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("offline-c1"));
        assert_eq!(stored.access_mode, AccessMode::Offline);
        assert!(stored.expires.is_none());
        assert_eq!(
            *h.oauth.exchanged.lock().unwrap(),
            ["online:c1", "offline:c1"]
        );
    }

    #[tokio::test]
    async fn test_offline_session_of_other_extension_is_replaced() {
        let h = harness(AccessMode::Offline);
        let offline_id = new_offline_id("https://api.fynd.com", "T1");
        let mut foreign = Session::new(offline_id.clone(), "T1", "other-extension");
        foreign.access_token = Some("foreign".to_string());
        h.flow.registry().save(&foreign).await.unwrap();

        let session = h
            .flow
            .auto_install(&RequestContext::new("T1"), "c2")
            .await
            .unwrap();

        assert_eq!(session.id, offline_id);
        assert_eq!(session.extension_id, "ext-key");
        assert_eq!(session.access_token.as_deref(), Some("offline-c2"));
    }

    #[tokio::test]
    async fn test_webhook_sync_failure_does_not_fail_authorize() {
        let webhooks = WebhookConfig::builder()
            .api_path("/webhooks")
            .notification_email("ops@example.com")
            .build()
            .unwrap();
        let engine = WebhookSyncEngine::new(webhooks, &config(AccessMode::Online));

        let mut h = harness(AccessMode::Online);
        h.flow = h.flow.with_webhook_sync(engine, Arc::new(DownPlatform));

        let install = h.flow.install(&RequestContext::new("T1")).await.unwrap();
        let state = stored_state(&h.flow, install.session_id()).await;

        let authorized = h
            .flow
            .authorize(&cookie_context(&install), "c1", &state)
            .await
            .unwrap();
        assert!(authorized.webhook_sync().is_none());
    }

    // ========================================================================
    // uninstall and auto_install
    // ========================================================================

    #[tokio::test]
    async fn test_uninstall_deletes_offline_session() {
        let h = harness(AccessMode::Offline);
        h.flow
            .auto_install(&RequestContext::new("T1"), "c1")
            .await
            .unwrap();
        assert!(h
            .flow
            .registry()
            .get_by_tenant("T1", "https://api.fynd.com")
            .await
            .is_some());

        h.flow.uninstall(&RequestContext::new("T1")).await.unwrap();

        assert!(h
            .flow
            .registry()
            .get_by_tenant("T1", "https://api.fynd.com")
            .await
            .is_none());
        let calls = h.callbacks.calls.lock().unwrap();
        let (name, context) = calls.last().unwrap();
        assert_eq!(*name, "uninstall");
        assert!(context.session.is_some());
    }

    #[tokio::test]
    async fn test_uninstall_callback_failure_keeps_deletion() {
        let h = harness(AccessMode::Offline);
        h.flow
            .auto_install(&RequestContext::new("T1"), "c1")
            .await
            .unwrap();
        h.callbacks.fail_uninstall.store(true, Ordering::SeqCst);

        let error = h.flow.uninstall(&RequestContext::new("T1")).await.unwrap_err();
        assert!(matches!(error, OAuthError::Callback { .. }));
        assert!(h
            .flow
            .registry()
            .get_by_tenant("T1", "https://api.fynd.com")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_auto_install_commits_offline_session_only() {
        let h = harness(AccessMode::Online);

        let session = h
            .flow
            .auto_install(&RequestContext::new("T1"), "c1")
            .await
            .unwrap();

        assert_eq!(session.access_mode, AccessMode::Offline);
        assert!(!session.is_new);
        assert_eq!(*h.oauth.exchanged.lock().unwrap(), ["offline:c1"]);
        let calls = h.callbacks.calls.lock().unwrap();
        assert_eq!(calls.last().unwrap().0, "auto_install");
    }

    #[tokio::test]
    async fn test_auto_install_requires_code() {
        let h = harness(AccessMode::Offline);
        let error = h
            .flow
            .auto_install(&RequestContext::new("T1"), " ")
            .await
            .unwrap_err();
        assert!(matches!(error, OAuthError::InvalidInput { .. }));
    }
}
