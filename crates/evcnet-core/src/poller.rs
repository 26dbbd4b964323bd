// ── Status and log polling ──
//
// Fetches the spot's status rows, total usage and session log, turns
// them into `StationStatus` / `LogSummary`, and commits them to the
// channel cache. Identifiers seen along the way feed the resolver.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use chrono::Utc;
use evcnet_api::{RawLogRow, RawSpot, RawStatusRow, Scalar, Transport};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{ChannelCache, ChannelState};
use crate::error::CoreError;
use crate::identity::{IdentifierKind, IdentityResolver};
use crate::model::{
    CachedStatus, Channel, ChargerState, LogEntry, LogSummary, SpotInfo, StationStatus,
    StatusFlags, parse_portal_time,
};
use crate::normalize::{self, DecimalMark};
use crate::session::SessionManager;
use crate::store::KeyValueStore;

pub struct Poller<T: Transport> {
    session: Arc<SessionManager<T>>,
    identity: Arc<IdentityResolver>,
    store: Arc<dyn KeyValueStore>,
    cache: ChannelCache,
    spot: ArcSwapOption<SpotInfo>,
    /// Latest failed discovery, tagged with the discoveries finished then.
    discovery: Mutex<Option<(u64, CoreError)>>,
    discoveries_finished: AtomicU64,
    pinned_spot: Option<String>,
    log_limit: usize,
    decimal_mark: DecimalMark,
}

impl<T: Transport> Poller<T> {
    pub fn new(
        session: Arc<SessionManager<T>>,
        identity: Arc<IdentityResolver>,
        store: Arc<dyn KeyValueStore>,
        max_channels: u8,
        pinned_spot: Option<String>,
        log_limit: usize,
        decimal_mark: DecimalMark,
    ) -> Self {
        Self {
            session,
            identity,
            store,
            cache: ChannelCache::new(max_channels),
            spot: ArcSwapOption::empty(),
            discovery: Mutex::new(None),
            discoveries_finished: AtomicU64::new(0),
            pinned_spot,
            log_limit,
            decimal_mark,
        }
    }

    // ── Cache reads ──────────────────────────────────────────────────

    /// Last good status of `channel`, or `Unknown`. Never blocks on I/O.
    pub fn get_cached(&self, channel: Channel) -> CachedStatus {
        self.cache
            .cell(channel)
            .map_or(CachedStatus::Unknown, |cell| cell.snapshot().status.clone())
    }

    pub fn channel_state(&self, channel: Channel) -> Option<Arc<ChannelState>> {
        self.cache.cell(channel).ok().map(|cell| cell.snapshot())
    }

    pub fn subscribe(&self, channel: Channel) -> Option<tokio::sync::watch::Receiver<Arc<ChannelState>>> {
        self.cache.cell(channel).ok().map(|cell| cell.subscribe())
    }

    pub fn max_channels(&self) -> u8 {
        self.cache.max_channels()
    }

    /// The discovered spot, if discovery already ran.
    pub fn cached_spot(&self) -> Option<Arc<SpotInfo>> {
        self.spot.load_full()
    }

    // ── Spot discovery ───────────────────────────────────────────────

    /// The recharge spot this bridge talks to, discovered on first use.
    ///
    /// Callers queued behind a discovery that fails get its error instead
    /// of starting another one, so a bad password costs one login per poll.
    pub async fn spot(&self) -> Result<Arc<SpotInfo>, CoreError> {
        if let Some(spot) = self.spot.load_full() {
            return Ok(spot);
        }
        let seen = self.discoveries_finished.load(Ordering::Acquire);
        let mut last_failure = self.discovery.lock().await;
        if let Some(spot) = self.spot.load_full() {
            return Ok(spot);
        }
        if let Some((_, err)) = last_failure.as_ref().filter(|(finished, _)| *finished > seen) {
            return Err(err.clone());
        }

        let outcome = self.discover().await;
        let finished = self.discoveries_finished.fetch_add(1, Ordering::AcqRel) + 1;
        match outcome {
            Ok(spot) => {
                *last_failure = None;
                self.spot.store(Some(Arc::clone(&spot)));
                Ok(spot)
            }
            Err(err) => {
                *last_failure = Some((finished, err.clone()));
                Err(err)
            }
        }
    }

    async fn discover(&self) -> Result<Arc<SpotInfo>, CoreError> {
        let client = self.session.client();
        let spots = self
            .session
            .run_authenticated(|session| async move { client.network_overview(&session).await })
            .await
            .map_err(CoreError::in_poll)?;

        let raw = match &self.pinned_spot {
            Some(id) => spots
                .into_iter()
                .find(|s| s.idx.to_string() == *id)
                .ok_or_else(|| CoreError::Poll {
                    message: format!("recharge spot {id} not found on this account"),
                })?,
            None => spots.into_iter().next().ok_or(CoreError::NoRechargeSpot)?,
        };

        let spot = Arc::new(spot_info(raw));
        info!(spot = %spot.id, channels = spot.channels, "discovered recharge spot");
        Ok(spot)
    }

    // ── Status ───────────────────────────────────────────────────────

    /// Fetch and cache the status of `channel`.
    ///
    /// Concurrent calls for the same channel share one fetch. On failure
    /// the cached status is left as it was and the error is returned.
    pub async fn refresh(&self, channel: Channel) -> Result<Arc<StationStatus>, CoreError> {
        let cell = self.cache.cell(channel)?;
        cell.status_flight
            .run(
                async { cell.commit_status(self.fetch_status(channel).await) },
                || cell.latest_status(),
            )
            .await
    }

    /// Like [`refresh`](Self::refresh), but never joins a fetch that was
    /// already in flight. Used after commands, whose effect an earlier
    /// fetch cannot have seen.
    pub async fn refresh_now(&self, channel: Channel) -> Result<Arc<StationStatus>, CoreError> {
        let cell = self.cache.cell(channel)?;
        cell.status_flight
            .run_fresh(async { cell.commit_status(self.fetch_status(channel).await) })
            .await
    }

    async fn fetch_status(&self, channel: Channel) -> Result<StationStatus, CoreError> {
        let spot = self.spot().await?;
        let client = self.session.client();
        let spot_id = spot.id.as_str();

        let rows = self
            .session
            .run_authenticated(|session| async move { client.spot_overview(&session, spot_id).await })
            .await
            .map_err(CoreError::in_poll)?;
        let row = select_row(rows, channel)?;
        self.observe(
            row.card_id.as_ref().and_then(Scalar::as_text),
            row.customer_id.as_ref().and_then(Scalar::as_text),
        );

        let usage = self
            .session
            .run_authenticated(|session| async move { client.total_usage(&session, spot_id).await })
            .await
            .map_err(CoreError::in_poll)?;
        let total_energy_kwh = usage.and_then(|u| {
            let number = normalize::scalar_number(&u.number, self.decimal_mark)?;
            normalize::energy_in_kwh(number, u.unit.as_deref().unwrap_or("kWh"))
        });

        let status = build_status(&spot, channel, row, total_energy_kwh, self.decimal_mark);
        debug!(
            channel = channel.get(),
            state = %status.state,
            power_kw = status.power_kw,
            "status refreshed"
        );
        Ok(status)
    }

    // ── Log ──────────────────────────────────────────────────────────

    /// Fetch and cache the session log of `channel`.
    pub async fn refresh_log(&self, channel: Channel) -> Result<Arc<LogSummary>, CoreError> {
        let cell = self.cache.cell(channel)?;
        cell.log_flight
            .run(
                async { cell.commit_log(self.fetch_log(channel).await) },
                || cell.latest_log(),
            )
            .await
    }

    async fn fetch_log(&self, channel: Channel) -> Result<LogSummary, CoreError> {
        let spot = self.spot().await?;
        let client = self.session.client();
        let spot_id = spot.id.as_str();
        let number = channel.get();

        let rows = self
            .session
            .run_authenticated(|session| async move {
                client.spot_log(&session, spot_id, number).await
            })
            .await
            .map_err(CoreError::in_poll)?;

        let summary = LogSummary::build(
            channel,
            rows.into_iter()
                .map(|row| log_entry(row, self.decimal_mark))
                .collect(),
            self.log_limit,
        );
        if let Some(newest) = summary.entries.first() {
            self.observe(newest.card_id.clone(), newest.customer_id.clone());
        }
        debug!(channel = number, entries = summary.entries.len(), "log refreshed");
        Ok(summary)
    }

    // ── Identifier observation ───────────────────────────────────────

    fn observe(&self, card: Option<String>, customer: Option<String>) {
        let seen = [
            (IdentifierKind::Card, card),
            (IdentifierKind::Customer, customer),
        ];
        for (kind, value) in seen {
            let Some(value) = value else {
                continue;
            };
            if self.identity.observe(kind, &value) {
                if let Err(e) = self.store.set(kind.store_key(), &value) {
                    warn!(identifier = %kind, error = %e, "failed to persist detected identifier");
                }
            }
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────

fn spot_info(raw: RawSpot) -> SpotInfo {
    let channels = raw
        .channel
        .as_ref()
        .and_then(|n| normalize::scalar_number(n, DecimalMark::Auto))
        .and_then(|n| float_to_u8(n.round()))
        .filter(|n| *n > 0)
        .unwrap_or(1);
    SpotInfo {
        id: raw.idx.to_string(),
        name: raw.name,
        software_version: raw.software_version,
        address: raw.address,
        channels,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn float_to_u8(value: f64) -> Option<u8> {
    (0.0..=f64::from(u8::MAX)).contains(&value).then(|| value as u8)
}

/// Pick the row of `channel`: by its `CHANNEL` column, else by position.
fn select_row(rows: Vec<RawStatusRow>, channel: Channel) -> Result<RawStatusRow, CoreError> {
    let wanted = f64::from(channel.get());
    let by_column = rows.iter().position(|row| {
        row.channel
            .as_ref()
            .and_then(|n| normalize::scalar_number(n, DecimalMark::Auto))
            .is_some_and(|n| (n - wanted).abs() < f64::EPSILON)
    });
    let index = by_column.unwrap_or(usize::from(channel.get()) - 1);
    rows.into_iter().nth(index).ok_or_else(|| CoreError::Poll {
        message: format!("no status row for channel {channel}"),
    })
}

fn build_status(
    spot: &SpotInfo,
    channel: Channel,
    row: RawStatusRow,
    total_energy_kwh: Option<f64>,
    mark: DecimalMark,
) -> StationStatus {
    let status_code = row.status.as_ref().and_then(Scalar::as_text).unwrap_or_default();
    let state = StatusFlags::parse(&status_code).map_or(ChargerState::Unknown, StatusFlags::state);
    let status_label = row
        .notification
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| state.to_string());

    StationStatus {
        channel,
        spot_id: spot.id.clone(),
        spot_name: spot.name.clone(),
        status_code,
        status_label,
        state,
        power_kw: row.power_kw.as_ref().and_then(|v| normalize::power_kw(v, "kW", mark)),
        total_energy_kwh,
        session_energy_kwh: row
            .session_energy_kwh
            .as_ref()
            .and_then(|v| normalize::energy_kwh(v, "kWh", mark)),
        session_hours: row.session_time.as_ref().and_then(|v| normalize::duration_hours(v, mark)),
        software_version: row.software_version.or_else(|| spot.software_version.clone()),
        fetched_at: Utc::now(),
    }
}

fn log_entry(row: RawLogRow, mark: DecimalMark) -> LogEntry {
    let started = row.start.unwrap_or_default();
    LogEntry {
        started_at: parse_portal_time(&started),
        started,
        ended: row.end.filter(|e| !e.trim().is_empty()),
        energy_kwh: row.energy.as_ref().and_then(|v| normalize::energy_kwh(v, "kWh", mark)),
        duration_hours: row.duration.as_ref().and_then(|v| normalize::duration_hours(v, mark)),
        card_id: row.card_id.as_ref().and_then(Scalar::as_text),
        customer_id: row.customer_id.as_ref().and_then(Scalar::as_text),
    }
}
