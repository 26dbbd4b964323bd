//! Configuration for the EVC-net bridge.
//!
//! A TOML file merged with `EVCNET_`-prefixed environment variables,
//! password resolution (env, keyring, plaintext), translation to
//! `evcnet_core::BridgeConfig`, and a JSON file store for the state the
//! bridge persists between runs.

mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use evcnet_core::{BridgeConfig, Credentials, DEFAULT_BASE_URL, DecimalMark, RetryPolicy};

pub use store::JsonFileStore;

/// Keyring service name; the account email is the keyring user.
pub const KEYRING_SERVICE: &str = "evcnet";

/// Environment variable checked first for the portal password.
pub const PASSWORD_ENV: &str = "EVCNET_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured (set it in {path} or via EVCNET_ environment variables)")]
    Missing { what: &'static str, path: String },

    #[error("no password for {email}: set EVCNET_PASSWORD, store one in the keyring, or add it to the config file")]
    NoPassword { email: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// On-disk configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileConfig {
    /// Portal base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account email.
    pub email: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// RFID card id; overrides the one detected from portal data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,

    /// Customer id; overrides the one detected from portal data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    /// Recharge spot to use instead of the account's first one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<String>,

    #[serde(default = "default_max_channels")]
    pub max_channels: u8,

    #[serde(default = "default_log_limit")]
    pub log_limit: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds to wait after start/stop before refreshing status.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: u64,

    /// Decimal separator of the portal locale: `auto`, `comma` or `period`.
    #[serde(default)]
    pub decimal_mark: DecimalMark,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            email: None,
            password: None,
            card_id: None,
            customer_id: None,
            spot_id: None,
            max_channels: default_max_channels(),
            log_limit: default_log_limit(),
            timeout: default_timeout(),
            settle_delay: default_settle_delay(),
            decimal_mark: DecimalMark::Auto,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(r: RetrySettings) -> Self {
        Self {
            max_retries: r.max_retries,
            initial_delay: Duration::from_millis(r.initial_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_max_channels() -> u8 {
    1
}
fn default_log_limit() -> usize {
    5
}
fn default_timeout() -> u64 {
    15
}
fn default_settle_delay() -> u64 {
    3
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    5_000
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "evcnet", "evcnet")
}

/// `$XDG_CONFIG_HOME/evcnet/config.toml` or the platform equivalent.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// File holding the persisted session cookie and detected identifiers.
pub fn state_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join("state.json"),
        |dirs| dirs.data_dir().join("state.json"),
    )
}

fn home_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("evcnet");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load from the default path plus the environment.
pub fn load_config() -> Result<FileConfig, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus the environment. A missing file yields defaults.
///
/// Nested keys use a double underscore, e.g. `EVCNET_RETRY__MAX_RETRIES`.
/// The password is not read here; see [`resolve_password`].
pub fn load_config_from(path: &Path) -> Result<FileConfig, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("EVCNET_").split("__").ignore(&["password"]));

    let config: FileConfig = figment.extract()?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Write `cfg` as TOML to `path`, creating parent directories.
pub fn save_config(cfg: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the portal password: env var, then keyring, then plaintext.
pub fn resolve_password(cfg: &FileConfig, email: &str) -> Result<SecretString, ConfigError> {
    pick_password(
        std::env::var(PASSWORD_ENV).ok(),
        || keyring_password(email),
        cfg.password.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoPassword {
        email: email.into(),
    })
}

fn pick_password(
    env: Option<String>,
    keyring: impl FnOnce() -> Option<String>,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    let non_empty = |s: &String| !s.is_empty();
    if let Some(pw) = env.filter(non_empty) {
        debug!(source = "env", "using portal password");
        return Some(SecretString::from(pw));
    }
    if let Some(pw) = keyring().filter(non_empty) {
        debug!(source = "keyring", "using portal password");
        return Some(SecretString::from(pw));
    }
    plaintext.filter(|s| !s.is_empty()).map(|pw| {
        debug!(source = "config", "using portal password");
        SecretString::from(pw.to_owned())
    })
}

fn keyring_password(email: &str) -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, email).ok()?;
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            debug!(error = %e, "keyring lookup failed");
            None
        }
    }
}

/// Store `password` for `email` in the system keyring.
pub fn store_password(email: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, email)?.set_password(password)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Parse and check a portal base URL.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Validation {
        field: "base_url".into(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("{raw}: scheme must be http or https")));
    }
    if url.host().is_none() {
        return Err(invalid(format!("{raw}: missing host")));
    }
    Ok(url)
}

/// Build a `BridgeConfig`, resolving the password.
pub fn to_bridge_config(cfg: &FileConfig) -> Result<BridgeConfig, ConfigError> {
    let email = cfg
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ConfigError::Missing {
            what: "email",
            path: config_path().display().to_string(),
        })?;
    let password = resolve_password(cfg, email)?;
    build_bridge_config(cfg, Credentials::new(email, password))
}

fn build_bridge_config(
    cfg: &FileConfig,
    credentials: Credentials,
) -> Result<BridgeConfig, ConfigError> {
    let mut config = BridgeConfig::new(parse_base_url(&cfg.base_url)?, credentials);
    config.card_id.clone_from(&cfg.card_id);
    config.customer_id.clone_from(&cfg.customer_id);
    config.spot_id.clone_from(&cfg.spot_id);
    config.max_channels = cfg.max_channels;
    config.log_limit = cfg.log_limit;
    config.timeout = Duration::from_secs(cfg.timeout);
    config.settle_delay = Duration::from_secs(cfg.settle_delay);
    config.decimal_mark = cfg.decimal_mark;
    config.retry = cfg.retry.into();

    config.validate().map_err(|e| ConfigError::Validation {
        field: "config".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}
