//! Request-scoped context passed to the install flow entry points.
//!
//! The embedding web framework builds one [`RequestContext`] per inbound
//! request from its query parameters and `Cookie` header, and hands it to
//! [`OAuthFlow`](crate::auth::oauth::OAuthFlow) explicitly.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::context::RequestContext;
//!
//! let context = RequestContext::from_query_string("organization_id=T1&application_id=app")
//!     .with_cookie_header("theme=dark; ext_session_T1=abc");
//!
//! assert_eq!(context.company_id(), Some("T1"));
//! assert_eq!(context.application_id(), Some("app"));
//! assert_eq!(context.session_id().as_deref(), Some("abc"));
//! ```

use crate::auth::oauth::session_cookie_name;

/// Identifiers of one inbound install, authorize or uninstall request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    company_id: Option<String>,
    application_id: Option<String>,
    cookie_header: Option<String>,
}

impl RequestContext {
    /// Context for `company_id` with no application or cookie.
    #[must_use]
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: Some(company_id.into()),
            ..Self::default()
        }
    }

    /// Builds a context from decoded query or body parameters.
    ///
    /// The tenant is read from `company_id`, falling back to
    /// `organization_id`. Empty values count as absent.
    #[must_use]
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut company_id = None;
        let mut organization_id = None;
        let mut application_id = None;

        for (key, value) in params {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "company_id" => company_id = Some(value),
                "organization_id" => organization_id = Some(value),
                "application_id" => application_id = Some(value),
                _ => {}
            }
        }

        Self {
            company_id: company_id.or(organization_id),
            application_id,
            cookie_header: None,
        }
    }

    /// Builds a context from a raw URL query string (without the leading `?`).
    #[must_use]
    pub fn from_query_string(query: &str) -> Self {
        Self::from_params(parse_query(query))
    }

    /// Sets the application (sales channel) id.
    #[must_use]
    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Sets the raw `Cookie` request header.
    #[must_use]
    pub fn with_cookie_header(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookie_header = Some(cookie_header.into());
        self
    }

    /// The tenant id, if the request carried one.
    #[must_use]
    pub fn company_id(&self) -> Option<&str> {
        self.company_id.as_deref()
    }

    /// The application id, if the request carried one.
    #[must_use]
    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    /// The raw `Cookie` header, if present.
    #[must_use]
    pub fn cookie_header(&self) -> Option<&str> {
        self.cookie_header.as_deref()
    }

    /// The install-time session id from this tenant's session cookie.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        session_id_from_cookie(self.cookie_header.as_deref()?, self.company_id.as_deref()?)
    }
}

/// Extracts the value of the `ext_session_{company_id}` cookie.
///
/// ```rust
/// use fp_extension::context::session_id_from_cookie;
///
/// let header = "ext_session_T2=other; ext_session_T1=abc";
/// assert_eq!(session_id_from_cookie(header, "T1").as_deref(), Some("abc"));
/// assert_eq!(session_id_from_cookie(header, "T3"), None);
/// ```
#[must_use]
pub fn session_id_from_cookie(cookie_header: &str, company_id: &str) -> Option<String> {
    let name = session_cookie_name(company_id);
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(component: &str) -> String {
    let component = component.replace('+', " ");
    urlencoding::decode(&component).map_or(component.clone(), |decoded| decoded.into_owned())
}
