// Portal session material
//
// The portal identifies a logged-in browser by its `PHPSESSID` cookie. A
// load balancer may add a sticky `SERVERID` cookie on any response; both
// travel together in the `Cookie` header and are persisted as one string.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Name of the cookie that carries the portal session.
pub const SESSION_COOKIE: &str = "PHPSESSID";

/// Account credentials used for the form login.
///
/// The password is only exposed when the login form is built.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

/// A single cookie issued by the portal.
#[derive(Clone)]
pub struct SessionCookie {
    pub name: String,
    pub value: SecretString,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: SecretString::from(value.into()),
        }
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=[REDACTED]", self.name)
    }
}

/// The set of cookies that make up an authenticated portal session.
///
/// Values are kept in [`SecretString`]s; `Debug` prints cookie names only.
#[derive(Clone, Default)]
pub struct Session {
    cookies: Vec<SessionCookie>,
}

impl Session {
    pub fn from_cookies(cookies: impl IntoIterator<Item = SessionCookie>) -> Self {
        let mut session = Self::default();
        session.merge(cookies);
        session
    }

    /// Parse the persisted `name=value; name=value` form.
    ///
    /// Returns `None` if no session cookie is present.
    pub fn from_persisted(raw: &str) -> Option<Self> {
        let cookies = raw.split(';').filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let (name, value) = (name.trim(), value.trim());
            (!name.is_empty() && !value.is_empty()).then(|| SessionCookie::new(name, value))
        });
        let session = Self::from_cookies(cookies);
        session.has_session_cookie().then_some(session)
    }

    /// Serialize for persistence. Same shape as the `Cookie` header.
    pub fn to_persisted(&self) -> String {
        self.cookie_header()
    }

    /// Build the `Cookie` request header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value.expose_secret()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn has_session_cookie(&self) -> bool {
        self.cookies.iter().any(|c| c.name == SESSION_COOKIE)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn cookie_names(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(|c| c.name.as_str())
    }

    /// Insert or replace cookies by name. Returns `true` if anything changed.
    pub fn merge(&mut self, updates: impl IntoIterator<Item = SessionCookie>) -> bool {
        let mut changed = false;
        for update in updates {
            match self.cookies.iter_mut().find(|c| c.name == update.name) {
                Some(existing) if existing.value.expose_secret() == update.value.expose_secret() => {}
                Some(existing) => {
                    existing.value = update.value;
                    changed = true;
                }
                None => {
                    self.cookies.push(update);
                    changed = true;
                }
            }
        }
        changed
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookie_names().collect::<Vec<_>>())
            .finish()
    }
}
