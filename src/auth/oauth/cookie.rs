//! Session cookie issued by the install endpoint.

use std::fmt;

/// Prefix of the per-tenant session cookie name.
pub const SESSION_COOKIE_PREFIX: &str = "ext_session";

/// Returns the cookie name for `company_id`, e.g. `ext_session_T1`.
#[must_use]
pub fn session_cookie_name(company_id: &str) -> String {
    format!("{SESSION_COOKIE_PREFIX}_{company_id}")
}

/// `Set-Cookie` value carrying the install-time session id.
///
/// Rendered with `HttpOnly; Secure; SameSite=None; Path=/` and a `Max-Age`
/// equal to the seconds left until the session expires.
///
/// # Example
///
/// ```rust
/// use fp_extension::auth::oauth::SessionCookie;
///
/// let cookie = SessionCookie::new("T1", "abc", 900);
/// assert_eq!(cookie.name(), "ext_session_T1");
/// assert_eq!(
///     cookie.to_string(),
///     "ext_session_T1=abc; Max-Age=900; Path=/; HttpOnly; Secure; SameSite=None"
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
    session_id: String,
    max_age: u64,
}

impl SessionCookie {
    /// Creates the cookie for `company_id` pointing at `session_id`.
    #[must_use]
    pub fn new(company_id: &str, session_id: impl Into<String>, max_age: u64) -> Self {
        Self {
            name: session_cookie_name(company_id),
            session_id: session_id.into(),
            max_age,
        }
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value (the session id).
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Lifetime in seconds.
    #[must_use]
    pub const fn max_age(&self) -> u64 {
        self.max_age
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Max-Age={}; Path=/; HttpOnly; Secure; SameSite=None",
            self.name, self.session_id, self.max_age
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_name_is_tenant_scoped() {
        assert_eq!(session_cookie_name("T1"), "ext_session_T1");
        assert_eq!(session_cookie_name("42"), "ext_session_42");
    }

    #[test]
    fn test_cookie_renders_all_attributes() {
        let rendered = SessionCookie::new("T1", "sid", 60).to_string();
        assert!(rendered.starts_with("ext_session_T1=sid;"));
        for attribute in ["Max-Age=60", "Path=/", "HttpOnly", "Secure", "SameSite=None"] {
            assert!(rendered.contains(attribute), "missing {attribute}");
        }
    }
}
