// ── Bridge facade ──
//
// The host-facing entry point: two triggers (`trigger_poll`,
// `trigger_action`) and read accessors over the per-channel cache. The
// bridge runs no timers of its own; the host decides when to poll.

use std::sync::Arc;

use evcnet_api::{HttpTransport, PortalClient, Transport};
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::ChannelState;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::CoreError;
use crate::identity::{IdentifierKind, IdentityResolver};
use crate::model::{
    Ack, Action, ActionOverrides, CachedStatus, Channel, LogSummary, SpotInfo, StationStatus,
};
use crate::poller::Poller;
use crate::session::{AuthState, SessionManager};
use crate::store::KeyValueStore;

/// Result of polling one channel.
#[derive(Debug, Clone)]
pub struct ChannelPoll {
    pub channel: Channel,
    pub status: Result<Arc<StationStatus>, CoreError>,
    pub log: Result<Arc<LogSummary>, CoreError>,
}

impl ChannelPoll {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok() && self.log.is_ok()
    }

    /// First failure of this poll, status before log.
    pub fn error(&self) -> Option<&CoreError> {
        self.status.as_ref().err().or(self.log.as_ref().err())
    }
}

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
pub struct Bridge<T: Transport = HttpTransport> {
    inner: Arc<BridgeInner<T>>,
}

impl<T: Transport> Clone for Bridge<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BridgeInner<T: Transport> {
    config: BridgeConfig,
    session: Arc<SessionManager<T>>,
    identity: Arc<IdentityResolver>,
    poller: Arc<Poller<T>>,
    dispatcher: Dispatcher<T>,
}

impl Bridge<HttpTransport> {
    /// Build a bridge talking HTTP to `config.base_url`.
    pub fn new(config: BridgeConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, CoreError> {
        config.validate()?;
        let transport = HttpTransport::new(config.base_url.clone(), &config.transport_config())?;
        Self::with_transport(config, transport, store)
    }
}

impl<T: Transport> Bridge<T> {
    /// Build a bridge over any [`Transport`].
    ///
    /// Restores the persisted session cookie and auto-detected ids from `store`.
    pub fn with_transport(
        config: BridgeConfig,
        transport: T,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let client = Arc::new(PortalClient::new(transport, config.retry));
        let session = Arc::new(SessionManager::new(
            client,
            config.credentials.clone(),
            config.base_url.clone(),
            Arc::clone(&store),
        ));

        let identity = Arc::new(IdentityResolver::new(
            config.card_id.clone(),
            config.customer_id.clone(),
        ));
        for kind in [IdentifierKind::Card, IdentifierKind::Customer] {
            match store.get(kind.store_key()) {
                Ok(Some(value)) => {
                    debug!(identifier = %kind, "restored detected identifier");
                    identity.seed(kind, value);
                }
                Ok(None) => {}
                Err(e) => warn!(identifier = %kind, error = %e, "failed to read detected identifier"),
            }
        }

        let poller = Arc::new(Poller::new(
            Arc::clone(&session),
            Arc::clone(&identity),
            store,
            config.max_channels,
            config.spot_id.clone(),
            config.log_limit,
            config.decimal_mark,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&session),
            Arc::clone(&poller),
            Arc::clone(&identity),
            config.settle_delay,
        );

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                session,
                identity,
                poller,
                dispatcher,
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Validate a 1-based channel number against the configured maximum.
    pub fn channel(&self, n: u8) -> Result<Channel, CoreError> {
        Channel::new(n, self.inner.config.max_channels)
    }

    // ── Triggers ─────────────────────────────────────────────────────

    /// Refresh status and log of one channel, or of every channel
    /// concurrently when `channel` is `None`.
    pub async fn trigger_poll(&self, channel: Option<u8>) -> Result<Vec<ChannelPoll>, CoreError> {
        let channels: Vec<Channel> = match channel {
            Some(n) => vec![self.channel(n)?],
            None => Channel::all(self.inner.config.max_channels).collect(),
        };
        Ok(join_all(channels.into_iter().map(|c| self.poll_channel(c))).await)
    }

    async fn poll_channel(&self, channel: Channel) -> ChannelPoll {
        let poller = &self.inner.poller;
        let (status, log) = tokio::join!(poller.refresh(channel), poller.refresh_log(channel));
        ChannelPoll {
            channel,
            status,
            log,
        }
    }

    /// Execute `action` on channel `n`.
    pub async fn trigger_action(
        &self,
        action: Action,
        n: u8,
        overrides: &ActionOverrides,
    ) -> Result<Ack, CoreError> {
        let channel = self.channel(n)?;
        self.inner.dispatcher.execute(action, channel, overrides).await
    }

    // ── Read accessors ───────────────────────────────────────────────

    /// Last good status; `Unknown` if never polled or the channel is invalid.
    pub fn status(&self, n: u8) -> CachedStatus {
        self.channel(n)
            .map_or(CachedStatus::Unknown, |c| self.inner.poller.get_cached(c))
    }

    pub fn log(&self, n: u8) -> Option<Arc<LogSummary>> {
        self.channel_state(n).and_then(|s| s.log.clone())
    }

    /// Failure of the most recent poll of channel `n`, if it failed.
    pub fn last_error(&self, n: u8) -> Option<CoreError> {
        self.channel_state(n).and_then(|s| s.last_error().cloned())
    }

    /// Reason of the last failed command on channel `n`; reading clears it.
    pub fn take_command_error(&self, n: u8) -> Option<String> {
        let channel = self.channel(n).ok()?;
        self.inner.dispatcher.take_failure(channel)
    }

    pub fn channel_state(&self, n: u8) -> Option<Arc<ChannelState>> {
        let channel = self.channel(n).ok()?;
        self.inner.poller.channel_state(channel)
    }

    pub fn subscribe(&self, n: u8) -> Option<watch::Receiver<Arc<ChannelState>>> {
        let channel = self.channel(n).ok()?;
        self.inner.poller.subscribe(channel)
    }

    pub fn spot(&self) -> Option<Arc<SpotInfo>> {
        self.inner.poller.cached_spot()
    }

    pub fn auth_state(&self) -> AuthState {
        self.inner.session.state()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.inner.session.subscribe()
    }

    /// Identifier a start command would use right now, without overrides.
    pub fn resolved_identifier(&self, kind: IdentifierKind) -> Option<String> {
        self.inner.identity.resolve(kind, None).map(|r| r.value)
    }
}
