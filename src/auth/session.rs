//! Session management for platform OAuth grants.
//!
//! This module provides the [`Session`] type, the [`AccessMode`] it was
//! granted under and the [`AccessToken`] returned by the token endpoints.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a grant is bound to its user.
///
/// `Online` tokens are short-lived and tied to the browser session that
/// installed the extension. `Offline` tokens are tenant-keyed and usable
/// without a browser session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Browser-session-bound token.
    #[default]
    Online,
    /// Durable tenant token.
    Offline,
}

impl AccessMode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            _ => Err(ConfigError::InvalidAccessMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// Token response from the platform's OAuth endpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The bearer token.
    pub access_token: String,

    /// Refresh token, when the grant is refreshable.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Scopes granted with the token.
    #[serde(default)]
    pub scope: Vec<String>,

    /// Access mode reported by the platform.
    #[serde(default)]
    pub access_mode: Option<AccessMode>,

    /// The user who approved the install (online grants only).
    #[serde(default)]
    pub current_user: Option<serde_json::Value>,
}

impl AccessToken {
    /// Absolute expiry of the token relative to `now`, if it has a lifetime.
    ///
    /// A lifetime outside the representable date range yields `None`.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

/// A persisted OAuth grant scoped to one tenant and access mode.
///
/// Sessions are created by the install flow with `is_new = true`, filled in
/// by [`Session::update_token`] once the authorization code is exchanged, and
/// persisted through [`SessionRegistry`](crate::auth::SessionRegistry).
///
/// `is_new` is transient: it is never serialized, so a session read back
/// from storage always has `is_new = false`.
///
/// # Thread Safety
///
/// `Session` is `Send + Sync`, making it safe to share across threads.
///
/// # Example
///
/// ```rust
/// use fp_extension::Session;
///
/// let session = Session::new("session-id", "T1", "ext-api-key");
///
/// assert!(session.is_new);
/// assert!(!session.is_active());
/// assert!(!session.expired());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session. Immutable once assigned.
    pub id: String,

    /// The tenant (company) this grant belongs to.
    pub company_id: String,

    /// The extension (API key) the grant was issued to.
    pub extension_id: String,

    /// Requested scopes, in order.
    #[serde(default)]
    pub scope: Vec<String>,

    /// Access mode of the grant.
    #[serde(default)]
    pub access_mode: AccessMode,

    /// Bearer token for platform API calls.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Refresh token, if the grant is refreshable.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Anti-forgery nonce echoed back by the OAuth redirect.
    #[serde(default)]
    pub state: Option<String>,

    /// When the session stops being valid. `None` means no expiry is tracked.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,

    /// When the access token stops being valid.
    #[serde(default)]
    pub access_token_validity: Option<DateTime<Utc>>,

    /// Token lifetime in seconds as reported by the token endpoint.
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// The user who approved the install, for online grants.
    #[serde(default)]
    pub current_user: Option<serde_json::Value>,

    /// Set on sessions created during this request.
    #[serde(skip)]
    pub is_new: bool,
}

impl Session {
    /// Creates a fresh, token-less session marked as new.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        company_id: impl Into<String>,
        extension_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            company_id: company_id.into(),
            extension_id: extension_id.into(),
            scope: Vec::new(),
            access_mode: AccessMode::Online,
            access_token: None,
            refresh_token: None,
            state: None,
            expires: None,
            access_token_validity: None,
            expires_in: None,
            current_user: None,
            is_new: true,
        }
    }

    /// Returns `true` if this session has expired.
    ///
    /// Sessions without an expiration time are considered never expired.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expires.is_some_and(|expires| Utc::now() > expires)
    }

    /// Returns `true` if this session is not expired and holds an access token.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
            && !self.expired()
    }

    /// Seconds from `now` until `expires`, rounded to the nearest second and
    /// clamped at zero. `None` when the session has no expiry.
    #[must_use]
    pub fn ttl_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires.map(|expires| {
            let millis = (expires - now).num_milliseconds();
            if millis <= 0 {
                0
            } else {
                (millis.unsigned_abs() + 500) / 1000
            }
        })
    }

    /// Copies the token fields from an exchanged token into this session.
    ///
    /// The session stops being new. `expires` is left alone: the caller
    /// decides whether the session itself expires with the token.
    pub fn update_token(&mut self, token: &AccessToken) {
        self.access_token = Some(token.access_token.clone());
        self.refresh_token.clone_from(&token.refresh_token);
        self.expires_in = token.expires_in;
        self.access_token_validity = token.expires_at(Utc::now());
        self.current_user.clone_from(&token.current_user);
        if let Some(mode) = token.access_mode {
            self.access_mode = mode;
        }
        self.is_new = false;
    }
}

// Verify Session is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session>();
};

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccessToken {
        AccessToken {
            access_token: "tok".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_in: Some(600),
            scope: vec!["company/products".to_string()],
            access_mode: Some(AccessMode::Online),
            current_user: Some(serde_json::json!({"_id": "u1"})),
        }
    }

    #[test]
    fn test_session_expired() {
        let mut session = Session::new("id", "T1", "ext");
        assert!(!session.expired());

        session.expires = Some(Utc::now() - Duration::hours(1));
        assert!(session.expired());

        session.expires = Some(Utc::now() + Duration::hours(1));
        assert!(!session.expired());
    }

    #[test]
    fn test_session_is_active_requires_token() {
        let mut session = Session::new("id", "T1", "ext");
        assert!(!session.is_active());

        session.access_token = Some(String::new());
        assert!(!session.is_active());

        session.update_token(&token());
        assert!(session.is_active());
    }

    #[test]
    fn test_update_token_copies_fields_and_clears_new_flag() {
        let mut session = Session::new("id", "T1", "ext");
        session.update_token(&token());

        assert_eq!(session.access_token.as_deref(), Some("tok"));
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(session.expires_in, Some(600));
        assert!(session.access_token_validity.is_some());
        assert_eq!(session.current_user, Some(serde_json::json!({"_id": "u1"})));
        assert!(!session.is_new);
        assert!(session.expires.is_none());
    }

    #[test]
    fn test_ttl_seconds_rounds_and_clamps() {
        let now = Utc::now();
        let mut session = Session::new("id", "T1", "ext");
        assert_eq!(session.ttl_seconds(now), None);

        session.expires = Some(now + Duration::milliseconds(1499));
        assert_eq!(session.ttl_seconds(now), Some(1));

        session.expires = Some(now + Duration::milliseconds(1500));
        assert_eq!(session.ttl_seconds(now), Some(2));

        session.expires = Some(now - Duration::seconds(30));
        assert_eq!(session.ttl_seconds(now), Some(0));
    }

    #[test]
    fn test_is_new_is_not_serialized() {
        let session = Session::new("id", "T1", "ext");
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("is_new").is_none());

        let back: Session = serde_json::from_value(json).unwrap();
        assert!(!back.is_new);
    }

    #[test]
    fn test_access_mode_parsing() {
        assert_eq!("offline".parse::<AccessMode>().unwrap(), AccessMode::Offline);
        assert_eq!("Online".parse::<AccessMode>().unwrap(), AccessMode::Online);
        assert!(matches!(
            "sometimes".parse::<AccessMode>(),
            Err(ConfigError::InvalidAccessMode { .. })
        ));
        assert_eq!(AccessMode::Offline.to_string(), "offline");
    }

    #[test]
    fn test_access_token_deserializes_sparse_response() {
        let token: AccessToken =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":3600}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_none());
        assert!(token.scope.is_empty());

        let now = Utc::now();
        assert_eq!(token.expires_at(now), Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_out_of_range_lifetime_has_no_expiry() {
        let now = Utc::now();
        let mut token = token();

        token.expires_in = Some(10_000_000_000_000);
        assert!(token.expires_at(now).is_none());

        token.expires_in = Some(i64::MIN);
        assert!(token.expires_at(now).is_none());

        let mut session = Session::new("id", "T1", "ext");
        session.update_token(&token);
        assert_eq!(session.access_token.as_deref(), Some("tok"));
        assert!(session.access_token_validity.is_none());
    }

    #[test]
    fn test_session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
    }
}
