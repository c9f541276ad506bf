//! Anti-forgery state nonce for the install flow.
//!
//! A fresh [`StateParam`] is stored on the install-time session and sent to
//! the authorize endpoint. The redirect back must echo it before the session
//! is trusted.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::auth::oauth::StateParam;
//!
//! let state = StateParam::new();
//! assert_eq!(state.as_ref().len(), 15);
//! assert!(state.matches(&state.as_ref().to_uppercase()));
//! ```

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::hmac::constant_time_compare;

/// Random alphanumeric OAuth state value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateParam(String);

// Verify StateParam is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<StateParam>();
};

impl StateParam {
    const NONCE_LENGTH: usize = 15;

    /// Generates a new nonce from a cryptographically secure RNG.
    #[must_use]
    pub fn new() -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::NONCE_LENGTH)
            .map(char::from)
            .collect();
        Self(nonce)
    }

    /// Wraps a stored state value.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns `true` if `received` equals this state, ignoring ASCII case.
    ///
    /// The comparison runs in constant time for equal-length inputs.
    #[must_use]
    pub fn matches(&self, received: &str) -> bool {
        constant_time_compare(
            &self.0.to_ascii_lowercase(),
            &received.to_ascii_lowercase(),
        )
    }

    /// Consumes the state, returning the raw string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for StateParam {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for StateParam {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
