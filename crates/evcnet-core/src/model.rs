// ── Domain model ──
//
// Normalized views of the portal's data. Everything the host reads is
// one of these types, never a raw wire struct.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::error::CoreError;

// ── Channel ─────────────────────────────────────────────────────────

/// Connector index on a spot, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Channel(u8);

impl Channel {
    pub const FIRST: Self = Self(1);

    /// Validate `n` against `1..=max`.
    pub fn new(n: u8, max: u8) -> Result<Self, CoreError> {
        if (1..=max).contains(&n) {
            Ok(Self(n))
        } else {
            Err(CoreError::InvalidChannel { channel: n, max })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All channels `1..=max`.
    pub fn all(max: u8) -> impl Iterator<Item = Self> {
        (1..=max).map(Self)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status flags ────────────────────────────────────────────────────

/// The 64-bit `STATUS` word, split into its two halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusFlags {
    pub status1: u32,
    pub status2: u32,
}

impl StatusFlags {
    pub const S1_NO_COMMUNICATION: u32 = 0x3000_0000;
    pub const S1_FAULT: u32 = 0x4000_002F;
    pub const S2_OCCUPIED: u32 = 0x0001_0000;
    pub const S2_BLOCKED: u32 = 0x0002_0000;
    pub const S2_FULL: u32 = 0x0004_0000;
    pub const S2_RESERVED: u32 = 0x0000_0400;
    pub const S2_FAULT: u32 = 0xD840_7940;

    /// Parse up to 16 hex digits, left-padded with zeros.
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.is_empty() || hex.len() > 16 {
            return None;
        }
        let word = u64::from_str_radix(hex, 16).ok()?;
        Some(Self {
            status1: u32::try_from(word >> 32).ok()?,
            status2: u32::try_from(word & 0xFFFF_FFFF).ok()?,
        })
    }

    pub fn state(self) -> ChargerState {
        if self.status1 & Self::S1_NO_COMMUNICATION != 0 {
            ChargerState::NoCommunication
        } else if self.status2 & Self::S2_BLOCKED != 0 {
            ChargerState::Blocked
        } else if self.status1 & Self::S1_FAULT != 0 || self.status2 & Self::S2_FAULT != 0 {
            ChargerState::Fault
        } else if self.status2 & Self::S2_OCCUPIED != 0 {
            ChargerState::Charging
        } else if self.status2 & Self::S2_FULL != 0 {
            ChargerState::Full
        } else if self.status2 & Self::S2_RESERVED != 0 {
            ChargerState::Reserved
        } else {
            ChargerState::Available
        }
    }
}

/// Decoded charger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargerState {
    Available,
    Charging,
    Full,
    Reserved,
    Blocked,
    Fault,
    NoCommunication,
    Unknown,
}

// ── Spot ────────────────────────────────────────────────────────────

/// A recharge spot discovered through the network overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotInfo {
    pub id: String,
    pub name: Option<String>,
    pub software_version: Option<String>,
    pub address: Option<String>,
    pub channels: u8,
}

// ── StationStatus ───────────────────────────────────────────────────

/// Normalized status of one channel at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    pub channel: Channel,
    pub spot_id: String,
    pub spot_name: Option<String>,
    /// Raw 16 hex digit `STATUS` word.
    pub status_code: String,
    pub status_label: String,
    pub state: ChargerState,
    pub power_kw: Option<f64>,
    pub total_energy_kwh: Option<f64>,
    pub session_energy_kwh: Option<f64>,
    pub session_hours: Option<f64>,
    pub software_version: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl StationStatus {
    pub fn is_charging(&self) -> bool {
        self.state == ChargerState::Charging
    }
}

/// What `get_cached` hands out: the last good status or an explicit unknown.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedStatus {
    Unknown,
    Known(Arc<StationStatus>),
}

impl CachedStatus {
    pub fn known(&self) -> Option<&Arc<StationStatus>> {
        match self {
            Self::Known(status) => Some(status),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

// ── Log ─────────────────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Best-effort parse of a portal timestamp.
pub fn parse_portal_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// One past charging session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub started: String,
    pub ended: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub energy_kwh: Option<f64>,
    pub duration_hours: Option<f64>,
    pub card_id: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Energy (kWh)")]
    energy: String,
    #[tabled(rename = "Duration (h)")]
    duration: String,
    #[tabled(rename = "Card")]
    card: String,
}

impl From<&LogEntry> for LogRow {
    fn from(entry: &LogEntry) -> Self {
        let number = |v: Option<f64>| v.map_or_else(|| "-".into(), |v| format!("{v:.2}"));
        Self {
            start: entry.started.clone(),
            end: entry.ended.clone().unwrap_or_else(|| "-".into()),
            energy: number(entry.energy_kwh),
            duration: number(entry.duration_hours),
            card: entry.card_id.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

/// The most recent sessions of a channel, newest first, with a
/// pre-rendered table built from the same entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    pub channel: Channel,
    pub entries: Vec<LogEntry>,
    pub table: String,
    pub fetched_at: DateTime<Utc>,
}

impl LogSummary {
    /// Order newest first, keep `limit` entries, render the table.
    ///
    /// Entries without a parsable start time keep their relative order
    /// after the dated ones.
    pub fn build(channel: Channel, mut entries: Vec<LogEntry>, limit: usize) -> Self {
        entries.sort_by_key(|e| Reverse(e.started_at));
        entries.truncate(limit);
        let table = render_log_table(&entries);
        Self {
            channel,
            entries,
            table,
            fetched_at: Utc::now(),
        }
    }
}

pub fn render_log_table(entries: &[LogEntry]) -> String {
    let rows: Vec<LogRow> = entries.iter().map(LogRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

// ── Actions ─────────────────────────────────────────────────────────

/// Commands the host can issue against one channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Action {
    Start,
    Stop,
    SoftReset,
    HardReset,
    UnlockConnector,
    Block,
    Unblock,
    RefreshStatus,
}

impl Action {
    pub fn portal_action(self) -> Option<evcnet_api::PortalAction> {
        use evcnet_api::PortalAction as P;

        Some(match self {
            Self::Start => P::StartTransaction,
            Self::Stop => P::StopTransaction,
            Self::SoftReset => P::SoftReset,
            Self::HardReset => P::HardReset,
            Self::UnlockConnector => P::UnlockConnector,
            Self::Block => P::Block,
            Self::Unblock => P::Unblock,
            Self::RefreshStatus => return None,
        })
    }

    /// Whether a follow-up status refresh should wait for the station to settle.
    pub fn changes_transaction(self) -> bool {
        matches!(self, Self::Start | Self::Stop)
    }
}

/// Per-call identifier overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOverrides {
    pub card_id: Option<String>,
    pub customer_id: Option<String>,
}

/// Successful command outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    pub action: Action,
    pub channel: Channel,
    /// Message returned by the portal, if any.
    pub message: Option<String>,
    /// Status after the follow-up refresh, when one ran and succeeded.
    pub status: Option<Arc<StationStatus>>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn status_word_is_split_into_halves() {
        let flags = StatusFlags::parse("0000000100010000");
        assert_eq!(
            flags,
            Some(StatusFlags {
                status1: 0x0000_0001,
                status2: 0x0001_0000,
            })
        );
        assert_eq!(StatusFlags::parse("10000").map(|f| f.status2), Some(0x10000));
        assert_eq!(StatusFlags::parse("zz"), None);
        assert_eq!(StatusFlags::parse("00000000000000000"), None);
    }

    #[test]
    fn state_priority() {
        let state = |s1, s2| StatusFlags { status1: s1, status2: s2 }.state();
        assert_eq!(state(0, 0), ChargerState::Available);
        assert_eq!(state(0, StatusFlags::S2_OCCUPIED), ChargerState::Charging);
        assert_eq!(state(0, StatusFlags::S2_FULL), ChargerState::Full);
        assert_eq!(state(0, StatusFlags::S2_RESERVED), ChargerState::Reserved);
        assert_eq!(
            state(0, StatusFlags::S2_OCCUPIED | StatusFlags::S2_BLOCKED),
            ChargerState::Blocked
        );
        assert_eq!(state(0x1, StatusFlags::S2_OCCUPIED), ChargerState::Fault);
        assert_eq!(
            state(StatusFlags::S1_NO_COMMUNICATION, StatusFlags::S2_BLOCKED),
            ChargerState::NoCommunication
        );
    }

    #[test]
    fn channel_bounds() {
        assert!(Channel::new(1, 1).is_ok());
        assert!(Channel::new(0, 2).is_err());
        assert!(Channel::new(3, 2).is_err());
        assert_eq!(Channel::all(3).map(Channel::get).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn action_names_parse() {
        assert_eq!(Action::from_str("unlock_connector").ok(), Some(Action::UnlockConnector));
        assert_eq!(Action::from_str("SOFT_RESET").ok(), Some(Action::SoftReset));
        assert_eq!(Action::RefreshStatus.to_string(), "refresh_status");
        assert!(Action::RefreshStatus.portal_action().is_none());
    }

    fn entry(started: &str, energy: f64) -> LogEntry {
        LogEntry {
            started: started.into(),
            ended: None,
            started_at: parse_portal_time(started),
            energy_kwh: Some(energy),
            duration_hours: None,
            card_id: Some("ABC12DEF34".into()),
            customer_id: None,
        }
    }

    #[test]
    fn log_summary_is_newest_first_and_truncated() {
        let entries = vec![
            entry("2024-03-01 08:00:00", 1.0),
            entry("garbled", 9.0),
            entry("2024-03-03 08:00:00", 3.0),
            entry("2024-03-02 08:00:00", 2.0),
        ];
        let summary = LogSummary::build(Channel::FIRST, entries, 3);
        let energies: Vec<_> = summary.entries.iter().map(|e| e.energy_kwh).collect();
        assert_eq!(energies, vec![Some(3.0), Some(2.0), Some(1.0)]);
    }

    #[test]
    fn log_table_has_header_and_one_line_per_entry() {
        let summary = LogSummary::build(
            Channel::FIRST,
            vec![entry("2024-03-01 08:00:00", 12.345)],
            5,
        );
        let lines: Vec<&str> = summary.table.lines().collect();
        // top border, header, separator, one row, bottom border
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("Energy (kWh)"));
        assert!(lines[3].contains("2024-03-01 08:00:00"));
        assert!(lines[3].contains("12.35") || lines[3].contains("12.34"));
    }

    #[test]
    fn portal_time_formats() {
        assert!(parse_portal_time("2024-03-01 08:00:00").is_some());
        assert!(parse_portal_time("01-03-2024 08:00").is_some());
        assert!(parse_portal_time("yesterday").is_none());
    }
}
