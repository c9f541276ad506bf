//! OAuth install flow for platform extensions.
//!
//! # Flow
//!
//! 1. **Install** ([`OAuthFlow::install`]): create an online session holding a
//!    state nonce, set the `ext_session_{company_id}` cookie and redirect the
//!    browser to the platform's consent page.
//!
//! 2. **Authorize** ([`OAuthFlow::authorize`]): the platform redirects back
//!    with `code` and `state`. The session named by the cookie must exist and
//!    its state must match; the code is then exchanged for a token and the
//!    session committed. In offline mode the tenant's canonical offline
//!    session is minted as well.
//!
//! 3. **Uninstall** ([`OAuthFlow::uninstall`]) and **auto-install**
//!    ([`OAuthFlow::auto_install`]) manage the offline session without a
//!    browser round trip.
//!
//! The embedding application plugs in through [`ExtensionCallbacks`]. The
//! token endpoints sit behind [`OAuthClient`], implemented for the platform by
//! [`PlatformOAuthClient`].
//!
//! # Security
//!
//! - **CSRF protection**: the state nonce is compared against the stored one
//!   without regard to ASCII case, in constant time
//! - **Tenant scoped cookies**: concurrent installs for different tenants in
//!   one browser do not clobber each other
//! - **Signatures**: [`hmac`] computes the HMAC-SHA256 hex digests used by
//!   webhook verification
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fp_extension::auth::oauth::{CallbackContext, CallbackError, ExtensionCallbacks, OAuthFlow};
//! use fp_extension::context::RequestContext;
//! use fp_extension::storage::MemoryStore;
//!
//! struct Callbacks;
//!
//! #[async_trait::async_trait]
//! impl ExtensionCallbacks for Callbacks {
//!     async fn auth(&self, context: &CallbackContext) -> Result<String, CallbackError> {
//!         Ok(format!("https://ext.example.com/company/{}", context.company_id))
//!     }
//! }
//!
//! let flow = OAuthFlow::from_config(config, Arc::new(MemoryStore::new()), Arc::new(Callbacks));
//!
//! let install = flow.install(&RequestContext::new("1")).await?;
//! // Redirect to install.redirect_url() with install.headers()
//! ```

mod callbacks;
mod client;
mod cookie;
mod error;
mod flow;
pub mod hmac;
mod state;

pub use callbacks::{CallbackContext, CallbackError, ExtensionCallbacks};
pub use client::{AuthorizationRequest, OAuthClient, PlatformOAuthClient};
pub use cookie::{session_cookie_name, SessionCookie, SESSION_COOKIE_PREFIX};
pub use error::OAuthError;
pub use flow::{AuthorizeResponse, FlowStage, InstallResponse, OAuthFlow, HEADER_COMPANY_ID};
pub use state::StateParam;
