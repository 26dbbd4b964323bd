// ── Per-channel status cache ──
//
// Each channel owns one cell. Refreshes of a cell run one at a time; a
// caller that arrives while a refresh is in flight joins it and reads
// its outcome instead of fetching again. The cell's state is an
// immutable snapshot published through a `watch` channel and swapped
// wholesale, so readers never see a half-applied update and never block
// on a fetch.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};

use crate::error::CoreError;
use crate::model::{CachedStatus, Channel, LogSummary, StationStatus};

// ── SingleFlight ────────────────────────────────────────────────────

/// Serializes a fetch and lets concurrent callers share one execution.
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    lock: Mutex<()>,
    completed: AtomicU64,
}

impl SingleFlight {
    /// Run `fetch` unless another run completed while we waited for the
    /// lock, in which case `joined` reads that run's outcome.
    ///
    /// A fetch that is cancelled does not count as completed.
    pub(crate) async fn run<R>(
        &self,
        fetch: impl Future<Output = R>,
        joined: impl FnOnce() -> R,
    ) -> R {
        let seen = self.completed.load(Ordering::Acquire);
        let _guard = self.lock.lock().await;
        if self.completed.load(Ordering::Acquire) != seen {
            return joined();
        }
        let outcome = fetch.await;
        self.completed.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Wait for any run in flight, then always run `fetch`.
    ///
    /// Callers that arrive meanwhile still join this run.
    pub(crate) async fn run_fresh<R>(&self, fetch: impl Future<Output = R>) -> R {
        let _guard = self.lock.lock().await;
        let outcome = fetch.await;
        self.completed.fetch_add(1, Ordering::AcqRel);
        outcome
    }
}

// ── ChannelState ────────────────────────────────────────────────────

/// Everything the host can read about one channel.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub channel: Channel,
    /// Last good status, or `Unknown` if no poll ever succeeded.
    pub status: CachedStatus,
    pub log: Option<Arc<LogSummary>>,
    /// Failure of the most recent status refresh, cleared on success.
    pub status_error: Option<CoreError>,
    /// Failure of the most recent log refresh, cleared on success.
    pub log_error: Option<CoreError>,
}

impl ChannelState {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            status: CachedStatus::Unknown,
            log: None,
            status_error: None,
            log_error: None,
        }
    }

    /// The most recent failure of either refresh.
    pub fn last_error(&self) -> Option<&CoreError> {
        self.status_error.as_ref().or(self.log_error.as_ref())
    }
}

// ── ChannelCell ─────────────────────────────────────────────────────

pub(crate) struct ChannelCell {
    pub(crate) status_flight: SingleFlight,
    pub(crate) log_flight: SingleFlight,
    state: watch::Sender<Arc<ChannelState>>,
}

impl ChannelCell {
    fn new(channel: Channel) -> Self {
        let (state, _) = watch::channel(Arc::new(ChannelState::new(channel)));
        Self {
            status_flight: SingleFlight::default(),
            log_flight: SingleFlight::default(),
            state,
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<ChannelState> {
        Arc::clone(&self.state.borrow())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<ChannelState>> {
        self.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut ChannelState)) {
        self.state.send_modify(|current| {
            let mut next = ChannelState::clone(current);
            f(&mut next);
            *current = Arc::new(next);
        });
    }

    /// Apply a status refresh outcome. Failure keeps the previous status.
    pub(crate) fn commit_status(
        &self,
        outcome: Result<StationStatus, CoreError>,
    ) -> Result<Arc<StationStatus>, CoreError> {
        match outcome {
            Ok(status) => {
                let status = Arc::new(status);
                let published = Arc::clone(&status);
                self.update(|s| {
                    s.status = CachedStatus::Known(published);
                    s.status_error = None;
                });
                Ok(status)
            }
            Err(e) => {
                let recorded = e.clone();
                self.update(|s| s.status_error = Some(recorded));
                Err(e)
            }
        }
    }

    /// Apply a log refresh outcome. Failure keeps the previous summary.
    pub(crate) fn commit_log(
        &self,
        outcome: Result<LogSummary, CoreError>,
    ) -> Result<Arc<LogSummary>, CoreError> {
        match outcome {
            Ok(summary) => {
                let summary = Arc::new(summary);
                let published = Arc::clone(&summary);
                self.update(|s| {
                    s.log = Some(published);
                    s.log_error = None;
                });
                Ok(summary)
            }
            Err(e) => {
                let recorded = e.clone();
                self.update(|s| s.log_error = Some(recorded));
                Err(e)
            }
        }
    }

    /// Outcome of the latest status refresh, for callers that joined it.
    pub(crate) fn latest_status(&self) -> Result<Arc<StationStatus>, CoreError> {
        let state = self.snapshot();
        if let Some(e) = &state.status_error {
            return Err(e.clone());
        }
        state.status.known().cloned().ok_or_else(|| CoreError::Poll {
            message: "no status available".into(),
        })
    }

    /// Outcome of the latest log refresh, for callers that joined it.
    pub(crate) fn latest_log(&self) -> Result<Arc<LogSummary>, CoreError> {
        let state = self.snapshot();
        if let Some(e) = &state.log_error {
            return Err(e.clone());
        }
        state.log.clone().ok_or_else(|| CoreError::Poll {
            message: "no log available".into(),
        })
    }
}

// ── ChannelCache ────────────────────────────────────────────────────

/// One [`ChannelCell`] per channel `1..=max`.
pub(crate) struct ChannelCache {
    cells: Vec<ChannelCell>,
}

impl ChannelCache {
    pub(crate) fn new(max_channels: u8) -> Self {
        Self {
            cells: Channel::all(max_channels).map(ChannelCell::new).collect(),
        }
    }

    pub(crate) fn max_channels(&self) -> u8 {
        u8::try_from(self.cells.len()).unwrap_or(u8::MAX)
    }

    pub(crate) fn cell(&self, channel: Channel) -> Result<&ChannelCell, CoreError> {
        usize::from(channel.get())
            .checked_sub(1)
            .and_then(|idx| self.cells.get(idx))
            .ok_or(CoreError::InvalidChannel {
                channel: channel.get(),
                max: self.max_channels(),
            })
    }
}
