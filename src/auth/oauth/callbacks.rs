//! Hooks the embedding application runs at each step of the install flow.

use async_trait::async_trait;

use crate::auth::Session;

/// Error type returned by [`ExtensionCallbacks`].
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// What a callback gets to see.
#[derive(Clone, Debug, PartialEq)]
pub struct CallbackContext {
    /// Tenant the flow runs for.
    pub company_id: String,
    /// Sales channel the flow was started from, if any.
    pub application_id: Option<String>,
    /// The session the step produced or removed.
    pub session: Option<Session>,
}

/// Application callbacks invoked by [`OAuthFlow`](super::OAuthFlow).
///
/// Only [`auth`](Self::auth) is required. It returns the URL the browser
/// lands on once the install completes.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use fp_extension::auth::oauth::{CallbackContext, CallbackError, ExtensionCallbacks};
///
/// struct Callbacks;
///
/// #[async_trait]
/// impl ExtensionCallbacks for Callbacks {
///     async fn auth(&self, context: &CallbackContext) -> Result<String, CallbackError> {
///         Ok(format!("https://ext.example.com/company/{}", context.company_id))
///     }
/// }
/// ```
#[async_trait]
pub trait ExtensionCallbacks: Send + Sync {
    /// Runs after a successful authorize. Returns the post-install redirect URL.
    async fn auth(&self, context: &CallbackContext) -> Result<String, CallbackError>;

    /// Runs when an install starts, before the browser is redirected.
    async fn install(&self, _context: &CallbackContext) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Runs after the tenant's sessions were removed.
    async fn uninstall(&self, _context: &CallbackContext) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Runs after a system-initiated install committed the offline session.
    async fn auto_install(&self, _context: &CallbackContext) -> Result<(), CallbackError> {
        Ok(())
    }
}
