//! Session management, status polling and command dispatch for EVC-net
//! charging stations.
//!
//! [`Bridge`] is the entry point. A host drives it with two triggers,
//! [`Bridge::trigger_poll`] and [`Bridge::trigger_action`], and reads the
//! per-channel cache in between. Nothing here schedules work on its own.
//!
//! ```no_run
//! # async fn demo() -> Result<(), evcnet_core::CoreError> {
//! use std::sync::Arc;
//!
//! use evcnet_core::{Bridge, BridgeConfig, MemoryStore};
//! use evcnet_api::Credentials;
//! use secrecy::SecretString;
//!
//! let config = BridgeConfig::new(
//!     evcnet_core::DEFAULT_BASE_URL.parse().map_err(|_| evcnet_core::CoreError::Config {
//!         message: "bad url".into(),
//!     })?,
//!     Credentials::new("owner@example.com", SecretString::from("secret".to_string())),
//! );
//! let bridge = Bridge::new(config, Arc::new(MemoryStore::new()))?;
//! bridge.trigger_poll(None).await?;
//! println!("{:?}", bridge.status(1));
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub(crate) mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod model;
pub mod normalize;
pub mod poller;
pub mod session;
pub mod store;

// ── Primary re-exports ───────────────────────────────────────────────

pub use bridge::{Bridge, ChannelPoll};
pub use cache::ChannelState;
pub use config::{BridgeConfig, DEFAULT_BASE_URL};
pub use normalize::DecimalMark;
pub use error::{CoreError, ErrorKind};
pub use identity::{IdentifierKind, IdentifierSource, IdentityResolver, Resolved};
pub use model::{
    Ack, Action, ActionOverrides, CachedStatus, Channel, ChargerState, LogEntry, LogSummary,
    SpotInfo, StationStatus, StatusFlags, render_log_table,
};
pub use session::{AuthState, SessionLease, SessionManager};
pub use store::{KeyValueStore, MemoryStore, keys};

// Wire-level types hosts commonly need alongside the bridge.
pub use evcnet_api::{Credentials, HttpTransport, RetryPolicy, Transport};
