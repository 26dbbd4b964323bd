// EVC-net portal client
//
// Wraps a `Transport` with the portal's login handshake, the `requests=`
// ajax envelope, session-expiry detection, and retry-with-backoff for
// transient failures. Endpoint methods live in `endpoints.rs`.

use std::future::Future;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{Credentials, SESSION_COOKIE, Session, SessionCookie};
use crate::error::{Error, preview};
use crate::transport::{HttpTransport, PortalRequest, PortalResponse, RetryPolicy, Transport};

pub(crate) const LOGIN_PATH: &str = "/Login/Login";
pub(crate) const AJAX_PATH: &str = "/api/ajax";

/// A decoded portal answer plus any cookies the response set.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub data: T,
    pub cookies: Vec<SessionCookie>,
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            data: f(self.data),
            cookies: self.cookies,
        }
    }
}

/// Raw HTTP client for the EVC-net portal.
///
/// Stateless with respect to the session: callers pass the [`Session`] in
/// and receive any refreshed cookies back in the [`Reply`].
pub struct PortalClient<T: Transport = HttpTransport> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> PortalClient<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    // ── Retry ────────────────────────────────────────────────────────

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    async fn retrying<R, F, Fut>(&self, label: &str, mut op: F) -> Result<R, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    attempt += 1;
                    warn!(
                        request = label,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient portal failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Execute one request, mapping 5xx to [`Error::Unavailable`].
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse, Error> {
        let resp = self.transport.execute(request).await?;
        if resp.status >= 500 {
            return Err(Error::Unavailable {
                status: resp.status,
            });
        }
        Ok(resp)
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Perform the form login and return the fresh session.
    ///
    /// The portal answers a good login with a 302 that sets `PHPSESSID`.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, Error> {
        let resp = self
            .retrying("login", || {
                let request = PortalRequest::new(LOGIN_PATH)
                    .field("emailField", credentials.email.clone())
                    .field("passwordField", credentials.password.expose_secret());
                self.send(request)
            })
            .await?;

        if resp.status != 302 {
            return Err(Error::Authentication {
                message: format!("login returned HTTP {} (expected 302)", resp.status),
            });
        }

        let session = Session::from_cookies(resp.cookies);
        if !session.has_session_cookie() {
            return Err(Error::Authentication {
                message: format!("login response did not set {SESSION_COOKIE}"),
            });
        }

        info!("authenticated with EVC-net portal");
        Ok(session)
    }

    // ── Ajax ─────────────────────────────────────────────────────────

    /// Post one ajax call and return element 0 of the response envelope.
    pub async fn ajax(&self, session: &Session, call: &AjaxCall) -> Result<Reply<Value>, Error> {
        let cookie = SecretString::from(session.cookie_header());
        let form = call.to_form_value();
        let label = call.method;

        let (body, cookies) = self
            .retrying(label, || {
                let request = PortalRequest::new(AJAX_PATH)
                    .field("requests", form.clone())
                    .with_cookie(cookie.clone());
                async move {
                    let resp = self.send(request).await?;
                    let cookies = resp.cookies.clone();
                    classify(resp).map(|body| (body, cookies))
                }
            })
            .await?;

        debug!(method = label, "ajax call succeeded");
        let data = first_result(body)?;
        Ok(Reply { data, cookies })
    }

    /// Ajax call decoded into `R`.
    pub(crate) async fn ajax_as<R: DeserializeOwned>(
        &self,
        session: &Session,
        call: &AjaxCall,
    ) -> Result<Reply<R>, Error> {
        let reply = self.ajax(session, call).await?;
        let raw = reply.data.to_string();
        let data = serde_json::from_value(reply.data).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: preview(&raw),
        })?;
        Ok(Reply {
            data,
            cookies: reply.cookies,
        })
    }
}

// ── AjaxCall ────────────────────────────────────────────────────────

/// One `{handler, method, params}` entry of the `requests` form field.
#[derive(Debug, Clone)]
pub struct AjaxCall {
    pub handler: &'static str,
    pub method: &'static str,
    pub params: Value,
}

impl AjaxCall {
    pub fn new(handler: &'static str, method: &'static str, params: Value) -> Self {
        Self {
            handler,
            method,
            params,
        }
    }

    /// The JSON string sent as the `requests` form field.
    pub fn to_form_value(&self) -> String {
        serde_json::json!({
            "0": {
                "handler": self.handler,
                "method": self.method,
                "params": self.params,
            }
        })
        .to_string()
    }
}

// ── Response classification ─────────────────────────────────────────

/// Turn a raw response into parsed JSON, detecting an expired session.
fn classify(resp: PortalResponse) -> Result<Value, Error> {
    match resp.status {
        401 | 302 => return Err(Error::SessionExpired),
        200 => {}
        status => {
            return Err(Error::Http {
                status,
                message: preview(&resp.body),
            });
        }
    }

    // An expired session gets the HTML login page with a 200.
    if !resp.looks_like_json() {
        return Err(Error::SessionExpired);
    }

    serde_json::from_str(&resp.body).map_err(|e| Error::Malformed {
        message: e.to_string(),
        body: preview(&resp.body),
    })
}

/// Pull the answer to request "0" out of the envelope.
fn first_result(body: Value) -> Result<Value, Error> {
    if let Some(reason) = rejection(&body) {
        return Err(Error::Rejected { message: reason });
    }

    let result = match body {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Object(mut map) if map.contains_key("0") => map.remove("0").unwrap_or(Value::Null),
        other => {
            return Err(Error::Deserialization {
                message: "response envelope has no result for request 0".into(),
                body: preview(&other.to_string()),
            });
        }
    };

    if let Some(reason) = rejection(&result) {
        return Err(Error::Rejected { message: reason });
    }
    Ok(result)
}

/// Extract the reason from an `{"error": ...}` object.
fn rejection(value: &Value) -> Option<String> {
    let error = value.as_object()?.get("error")?;
    let reason = match error {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) => s.clone(),
        Value::Object(inner) => inner
            .get("message")
            .or_else(|| inner.get("msg"))
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), String::from),
        other => other.to_string(),
    };
    Some(reason)
}
