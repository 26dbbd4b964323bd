// ── Command dispatch ──
//
// Turns an `Action` on a channel into one authenticated portal request.
// Refusals are never retried; the channel is refreshed afterwards either
// way so the cache reflects what the station actually did.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use evcnet_api::{StartIdentifiers, Transport};
use tracing::{info, warn};

use crate::error::{CoreError, ErrorKind};
use crate::identity::{IdentifierKind, IdentityResolver};
use crate::model::{Ack, Action, ActionOverrides, Channel};
use crate::poller::Poller;
use crate::session::SessionManager;

pub struct Dispatcher<T: Transport> {
    session: Arc<SessionManager<T>>,
    poller: Arc<Poller<T>>,
    identity: Arc<IdentityResolver>,
    settle_delay: Duration,
    failures: DashMap<Channel, String>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        session: Arc<SessionManager<T>>,
        poller: Arc<Poller<T>>,
        identity: Arc<IdentityResolver>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            session,
            poller,
            identity,
            settle_delay,
            failures: DashMap::new(),
        }
    }

    /// Execute `action` on `channel`.
    ///
    /// A failure is returned and also kept as a read-once reason, see
    /// [`take_failure`](Self::take_failure).
    pub async fn execute(
        &self,
        action: Action,
        channel: Channel,
        overrides: &ActionOverrides,
    ) -> Result<Ack, CoreError> {
        let outcome = self.run(action, channel, overrides).await;
        match &outcome {
            Ok(_) => {
                self.failures.remove(&channel);
            }
            Err(e) => {
                warn!(%action, channel = channel.get(), kind = %e.kind(), error = %e, "command failed");
                self.failures.insert(channel, e.to_string());
            }
        }
        outcome
    }

    /// Reason of the last failed command on `channel`, cleared by reading.
    pub fn take_failure(&self, channel: Channel) -> Option<String> {
        self.failures.remove(&channel).map(|(_, reason)| reason)
    }

    async fn run(
        &self,
        action: Action,
        channel: Channel,
        overrides: &ActionOverrides,
    ) -> Result<Ack, CoreError> {
        let Some(portal_action) = action.portal_action() else {
            let status = self.poller.refresh(channel).await?;
            return Ok(Ack {
                action,
                channel,
                message: None,
                status: Some(status),
            });
        };

        let identifiers = match action {
            Action::Start => Some(self.start_identifiers(overrides)?),
            _ => None,
        };

        let spot = self.poller.spot().await?;
        let client = self.session.client();
        let spot_id = spot.id.as_str();
        let number = channel.get();
        let ids = identifiers.as_ref();

        let sent = self
            .session
            .run_authenticated(|session| async move {
                client
                    .action(&session, spot_id, number, portal_action, ids)
                    .await
            })
            .await
            .map_err(|e| e.for_action(action));

        match sent {
            Ok(result) => {
                info!(%action, channel = number, "command accepted");
                if action.changes_transaction() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                let status = match self.poller.refresh_now(channel).await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!(channel = number, error = %e, "refresh after command failed");
                        None
                    }
                };
                Ok(Ack {
                    action,
                    channel,
                    message: result.message,
                    status,
                })
            }
            Err(e) => {
                // The station may have changed state anyway (a failed start
                // can leave it faulted); make the cache show it.
                if matches!(e.kind(), ErrorKind::Command | ErrorKind::Transport) {
                    if let Err(refresh) = self.poller.refresh_now(channel).await {
                        warn!(channel = number, error = %refresh, "refresh after failed command failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Card id first, so with neither available the error names `card_id`.
    fn start_identifiers(&self, overrides: &ActionOverrides) -> Result<StartIdentifiers, CoreError> {
        let resolve = |kind, value: &Option<String>| {
            self.identity
                .resolve(kind, value.as_deref())
                .map(|r| r.value)
                .ok_or(CoreError::MissingIdentifier { identifier: kind })
        };
        Ok(StartIdentifiers {
            card_id: resolve(IdentifierKind::Card, &overrides.card_id)?,
            customer_id: resolve(IdentifierKind::Customer, &overrides.customer_id)?,
        })
    }
}
