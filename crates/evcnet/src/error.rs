//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use evcnet_config::ConfigError;
use evcnet_core::{CoreError, IdentifierKind};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 4;
    pub const MISSING_IDENTIFIER: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the EVC-net portal: {message}")]
    #[diagnostic(
        code(evcnet::connection_failed),
        help("Check network access and the base_url in your config, then try again.")
    )]
    ConnectionFailed { message: String },

    #[error("Portal request timed out after {seconds}s")]
    #[diagnostic(
        code(evcnet::timeout),
        help("Increase `timeout` in the config file or try again later.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(evcnet::auth_failed),
        help(
            "Verify the email and password used for the portal.\n\
             Run: evcnet config set-password"
        )
    )]
    AuthFailed { message: String },

    // ── Polling / commands ───────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(evcnet::poll_failed))]
    PollFailed { message: String },

    #[error("No recharge spot found for this account")]
    #[diagnostic(
        code(evcnet::no_spot),
        help("Check that the account can see the station in the portal, or set spot_id.")
    )]
    NoRechargeSpot,

    #[error("{action} rejected by portal: {reason}")]
    #[diagnostic(code(evcnet::rejected))]
    Rejected { action: String, reason: String },

    #[error("No {identifier} available for start")]
    #[diagnostic(
        code(evcnet::missing_identifier),
        help(
            "Set {identifier} in the config file, pass --{flag}, or run `evcnet log` \
             after a session that used the card so it can be detected."
        )
    )]
    MissingIdentifier {
        identifier: IdentifierKind,
        flag: &'static str,
    },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(evcnet::validation))]
    Validation { field: String, reason: String },

    #[error("No account configured")]
    #[diagnostic(
        code(evcnet::no_config),
        help(
            "Create one with: evcnet config init --email <EMAIL>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("No password for {email}")]
    #[diagnostic(
        code(evcnet::no_password),
        help(
            "Run: evcnet config set-password\n\
             Or set the EVCNET_PASSWORD environment variable."
        )
    )]
    NoPassword { email: String },

    #[error(transparent)]
    #[diagnostic(code(evcnet::config))]
    Config(ConfigError),

    #[error("State storage error: {message}")]
    #[diagnostic(
        code(evcnet::storage),
        help("The state file can be deleted safely; the next run logs in again.")
    )]
    Storage { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(evcnet::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoPassword { .. } => exit_code::AUTH,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::MissingIdentifier { .. } => exit_code::MISSING_IDENTIFIER,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { message, .. } => Self::ConnectionFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Auth { message } => Self::AuthFailed { message },
            e @ CoreError::Poll { .. } => Self::PollFailed {
                message: e.to_string(),
            },
            CoreError::NoRechargeSpot => Self::NoRechargeSpot,
            CoreError::Command { action, reason } => Self::Rejected { action, reason },
            CoreError::MissingIdentifier { identifier } => Self::MissingIdentifier {
                identifier,
                flag: match identifier {
                    IdentifierKind::Card => "card-id",
                    IdentifierKind::Customer => "customer-id",
                },
            },
            CoreError::InvalidChannel { channel, max } => Self::Validation {
                field: "channel".into(),
                reason: format!("{channel} is outside 1..={max}"),
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Storage { message } => Self::Storage { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing { path, .. } => Self::NoConfig { path },
            ConfigError::NoPassword { email } => Self::NoPassword { email },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
