use thiserror::Error;

/// Top-level error type for the `evcnet-api` crate.
///
/// Covers every failure mode of talking to the portal: login, transport,
/// session expiry, malformed bodies, and business rejections.
/// `evcnet-core` maps these into its own error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (wrong credentials, no session cookie issued, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The portal no longer accepts the session cookie.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),

    // ── Portal responses ────────────────────────────────────────────
    /// 5xx from the portal; the backend is temporarily unavailable.
    #[error("Portal unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// Any other unexpected HTTP status.
    #[error("Unexpected HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The body looked like JSON but could not be parsed (truncated, garbled).
    #[error("Malformed response body: {message}")]
    Malformed { message: String, body: String },

    /// JSON parsed, but did not have the expected shape.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The portal refused the request for a business reason ("charger busy").
    #[error("Rejected by portal: {message}")]
    Rejected { message: String },
}

impl Error {
    /// Returns `true` if the session cookie was refused and a fresh login
    /// might resolve it.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::Unavailable { .. } | Self::Malformed { .. } => true,
            _ => false,
        }
    }

    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unavailable { status } | Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Shorten a response body for inclusion in an error message.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_and_malformed_are_transient() {
        assert!(Error::Unavailable { status: 503 }.is_transient());
        assert!(
            Error::Malformed {
                message: "eof".into(),
                body: "[".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn rejections_and_expiry_are_not_transient() {
        assert!(
            !Error::Rejected {
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(!Error::SessionExpired.is_transient());
        assert!(Error::SessionExpired.is_session_expired());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), 200);
    }
}
