// HTTP transport for the EVC-net portal
//
// The portal sits behind bot filtering that rejects anything not shaped like
// a browser XHR, so every request carries the same header set. Redirects are
// never followed: a 302 is how the portal signals both a successful login and
// an expired session, and the caller needs to see it.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::auth::SessionCookie;
use crate::error::Error;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

// ── RetryPolicy ─────────────────────────────────────────────────────

/// Exponential backoff for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 3.
    pub max_retries: u32,

    /// Delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,

    /// Upper bound on a single delay. Default: 5s.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that surfaces the first failure.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

// ── TransportConfig ─────────────────────────────────────────────────

/// Settings shared by every request issued against the portal.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.into(),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` with the browser header set and redirects disabled.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}

// ── Request / response ──────────────────────────────────────────────

/// One form POST against the portal.
#[derive(Clone)]
pub struct PortalRequest {
    pub path: String,
    pub form: Vec<(String, String)>,
    /// Value for the `Cookie` header, if the request is authenticated.
    pub cookie: Option<SecretString>,
}

impl PortalRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            form: Vec::new(),
            cookie: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, cookie: SecretString) -> Self {
        self.cookie = Some(cookie);
        self
    }
}

impl fmt::Debug for PortalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalRequest")
            .field("path", &self.path)
            .field(
                "form",
                &self.form.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("authenticated", &self.cookie.is_some())
            .finish()
    }
}

/// What came back, before any envelope interpretation.
#[derive(Debug, Clone, Default)]
pub struct PortalResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Cookies set by this response (`Set-Cookie`).
    pub cookies: Vec<SessionCookie>,
    pub body: String,
}

impl PortalResponse {
    pub fn looks_like_json(&self) -> bool {
        matches!(self.body.trim_start().chars().next(), Some('[' | '{'))
    }
}

// ── Transport trait ─────────────────────────────────────────────────

/// A single request/response exchange with the portal.
///
/// [`HttpTransport`] is the real implementation; tests substitute a
/// scripted one.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: PortalRequest,
    ) -> impl Future<Output = Result<PortalResponse, Error>> + Send;
}

/// `reqwest`-backed transport bound to one portal base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: Url, config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            base_url,
            timeout: config.timeout,
        })
    }

    /// Use a pre-built client (tests, custom TLS).
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: TransportConfig::default().timeout,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, Error> {
        let url = self.url(&request.path)?;
        let started = Instant::now();

        let mut builder = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(&request.form);
        if let Some(cookie) = &request.cookie {
            builder = builder.header(header::COOKIE, cookie.expose_secret());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let cookies = resp
            .cookies()
            .map(|c| SessionCookie::new(c.name(), c.value()))
            .collect();
        let body = resp.text().await.map_err(Error::Transport)?;

        debug!(
            path = %request.path,
            status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "portal request"
        );

        Ok(PortalResponse {
            status,
            content_type,
            cookies,
            body,
        })
    }
}
