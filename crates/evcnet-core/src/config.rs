// ── Bridge configuration ──
//
// Runtime description of one portal account. Loading from files and the
// environment happens in `evcnet-config`; this type only holds values.

use std::time::Duration;

use evcnet_api::{Credentials, RetryPolicy, TransportConfig};
use url::Url;

use crate::error::CoreError;
use crate::normalize::DecimalMark;

pub const DEFAULT_BASE_URL: &str = "https://50five-sbelux.evc-net.com";

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: Url,
    pub credentials: Credentials,
    /// Configured RFID card id; wins over an auto-detected one.
    pub card_id: Option<String>,
    /// Configured customer id; wins over an auto-detected one.
    pub customer_id: Option<String>,
    /// Pin a recharge spot instead of using the first one on the account.
    pub spot_id: Option<String>,
    pub max_channels: u8,
    /// Number of log entries kept in the summary.
    pub log_limit: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Wait after start/stop before refreshing, so the station reports the new state.
    pub settle_delay: Duration,
    /// Decimal separator the portal uses when a number has only one.
    pub decimal_mark: DecimalMark,
}

impl BridgeConfig {
    pub fn new(base_url: Url, credentials: Credentials) -> Self {
        Self {
            base_url,
            credentials,
            card_id: None,
            customer_id: None,
            spot_id: None,
            max_channels: 1,
            log_limit: 5,
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            settle_delay: Duration::from_secs(3),
            decimal_mark: DecimalMark::Auto,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !matches!(self.base_url.scheme(), "http" | "https") || self.base_url.host().is_none() {
            return Err(CoreError::Config {
                message: format!("base URL must be http(s) with a host: {}", self.base_url),
            });
        }
        if self.credentials.email.trim().is_empty() {
            return Err(CoreError::Config {
                message: "email must not be empty".into(),
            });
        }
        if self.max_channels == 0 {
            return Err(CoreError::Config {
                message: "max_channels must be at least 1".into(),
            });
        }
        if self.log_limit == 0 {
            return Err(CoreError::Config {
                message: "log_limit must be at least 1".into(),
            });
        }
        if self.timeout.is_zero() {
            return Err(CoreError::Config {
                message: "timeout must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.timeout,
            retry: self.retry,
            ..TransportConfig::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config(url: &str) -> BridgeConfig {
        BridgeConfig::new(
            Url::parse(url).unwrap(),
            Credentials::new("owner@example.com", SecretString::from("pw".to_string())),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = config(DEFAULT_BASE_URL);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_channels, 1);
        assert_eq!(cfg.log_limit, 5);
        assert_eq!(cfg.settle_delay, Duration::from_secs(3));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        assert!(config("ftp://portal.example.com").validate().is_err());
    }

    #[test]
    fn zero_channels_is_rejected() {
        let mut cfg = config(DEFAULT_BASE_URL);
        cfg.max_channels = 0;
        assert!(matches!(cfg.validate(), Err(CoreError::Config { .. })));
    }
}
