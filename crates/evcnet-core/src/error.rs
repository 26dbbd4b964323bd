// ── Core error types ──
//
// Errors surfaced to the host. Wire-level failures from `evcnet-api` are
// folded into a small taxonomy with a stable `ErrorKind`; messages never
// carry credentials or cookie values.

use thiserror::Error;

use crate::identity::IdentifierKind;

/// Stable classification of a [`CoreError`], for hosts that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Auth,
    Poll,
    Command,
    MissingIdentifier,
    Config,
    Storage,
}

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    /// Network failure or portal unavailability, after retries.
    #[error("Cannot reach EVC-net portal: {message}")]
    Transport { message: String, status: Option<u16> },

    #[error("EVC-net portal timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ── Polling ──────────────────────────────────────────────────────
    /// The portal answered but the data was unusable.
    #[error("Status poll failed: {message}")]
    Poll { message: String },

    #[error("No recharge spot found for this account")]
    NoRechargeSpot,

    // ── Commands ─────────────────────────────────────────────────────
    /// The portal refused a command.
    #[error("{action} rejected by portal: {reason}")]
    Command { action: String, reason: String },

    #[error("Missing identifier: {identifier} is neither configured nor auto-detected")]
    MissingIdentifier { identifier: IdentifierKind },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Channel {channel} out of range (1..={max})")]
    InvalidChannel { channel: u8, max: u8 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Persisted state ──────────────────────────────────────────────
    #[error("State storage error: {message}")]
    Storage { message: String },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => ErrorKind::Transport,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Poll { .. } | Self::NoRechargeSpot => ErrorKind::Poll,
            Self::Command { .. } => ErrorKind::Command,
            Self::MissingIdentifier { .. } => ErrorKind::MissingIdentifier,
            Self::InvalidChannel { .. } | Self::Config { .. } => ErrorKind::Config,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Worth trying again on the next scheduled tick.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<evcnet_api::Error> for CoreError {
    fn from(err: evcnet_api::Error) -> Self {
        use evcnet_api::Error as Api;

        match err {
            Api::Authentication { message } => Self::Auth { message },
            Api::SessionExpired => Self::Auth {
                message: "session rejected by portal".into(),
            },
            Api::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            Api::Transport(ref e) if e.is_timeout() => Self::Timeout { timeout_secs: 0 },
            Api::Unavailable { status } => Self::Transport {
                message: "portal temporarily unavailable".into(),
                status: Some(status),
            },
            Api::Http { status, message } => Self::Transport {
                message,
                status: Some(status),
            },
            Api::Malformed { message, .. } => Self::Transport {
                message: format!("malformed response: {message}"),
                status: None,
            },
            ref e @ (Api::Transport(_) | Api::InvalidUrl(_) | Api::Client(_)) => Self::Transport {
                message: e.to_string(),
                status: e.status(),
            },
            Api::Deserialization { message, .. } => Self::Poll {
                message: format!("unexpected response shape: {message}"),
            },
            Api::Rejected { message } => Self::Command {
                action: "request".into(),
                reason: message,
            },
        }
    }
}

impl CoreError {
    /// A refusal met while fetching data is a poll failure.
    pub(crate) fn in_poll(self) -> Self {
        match self {
            Self::Command { reason, .. } => Self::Poll {
                message: format!("portal refused request: {reason}"),
            },
            other => other,
        }
    }

    /// Attribute a refusal to the command that caused it.
    pub(crate) fn for_action(self, action: impl ToString) -> Self {
        match self {
            Self::Command { reason, .. } => Self::Command {
                action: action.to_string(),
                reason,
            },
            other => other,
        }
    }
}
