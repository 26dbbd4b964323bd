// Raw EVC-net payloads
//
// Field names mirror the portal's upper-case column names. Numeric columns
// arrive as JSON numbers, locale-formatted strings ("1,5") or empty strings
// depending on the station firmware, so they are captured as `Scalar` and
// normalized by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A loosely typed JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Text form, with empty strings treated as absent.
    pub fn as_text(&self) -> Option<String> {
        let text = self.to_string();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// One recharge spot from `networkOverview`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSpot {
    #[serde(rename = "IDX")]
    pub idx: Scalar,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    /// Number of channels (connectors) on the spot.
    #[serde(rename = "CHANNEL", default)]
    pub channel: Option<Scalar>,
    #[serde(rename = "SOFTWARE_VERSION", default)]
    pub software_version: Option<String>,
    #[serde(rename = "ADDRESS", default)]
    pub address: Option<String>,
}

/// One channel row from `RechargeSpotsAsyncService.overview`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStatusRow {
    /// 16 hex digit status word.
    #[serde(rename = "STATUS", default)]
    pub status: Option<Scalar>,
    /// Human-readable status text as shown in the portal.
    #[serde(rename = "NOTIFICATION", default)]
    pub notification: Option<String>,
    #[serde(rename = "MOM_POWER_KW", default)]
    pub power_kw: Option<Scalar>,
    #[serde(rename = "TRANS_ENERGY_DELIVERED_KWH", default)]
    pub session_energy_kwh: Option<Scalar>,
    /// Session duration as `H:MM`.
    #[serde(rename = "TRANSACTION_TIME_H_M", default)]
    pub session_time: Option<Scalar>,
    #[serde(rename = "CARDID", default)]
    pub card_id: Option<Scalar>,
    #[serde(rename = "CUSTOMERS_IDX", default)]
    pub customer_id: Option<Scalar>,
    #[serde(rename = "CHANNEL", default)]
    pub channel: Option<Scalar>,
    #[serde(rename = "SOFTWARE_VERSION", default)]
    pub software_version: Option<String>,
}

/// Cumulative usage from `totalUsage`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUsage {
    pub number: Scalar,
    #[serde(default)]
    pub unit: Option<String>,
}

/// One past charging session from `RechargeSpotsAsyncService.log`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogRow {
    #[serde(rename = "START_DATE", default)]
    pub start: Option<String>,
    #[serde(rename = "END_DATE", default)]
    pub end: Option<String>,
    #[serde(rename = "ENERGY", default)]
    pub energy: Option<Scalar>,
    /// Duration as `H:MM`.
    #[serde(rename = "DURATION", default)]
    pub duration: Option<Scalar>,
    #[serde(rename = "CARDID", default)]
    pub card_id: Option<Scalar>,
    #[serde(rename = "CUSTOMERS_IDX", default)]
    pub customer_id: Option<Scalar>,
    #[serde(rename = "CHANNEL", default)]
    pub channel: Option<Scalar>,
}

/// Portal answer to a command. The body varies by firmware; only a
/// message, when present, is of interest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActionResult {
    #[serde(default, alias = "msg", alias = "MESSAGE")]
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_row_accepts_mixed_scalar_types() {
        let row: RawStatusRow = serde_json::from_value(json!({
            "STATUS": "0000000000010000",
            "NOTIFICATION": "Charging",
            "MOM_POWER_KW": "7,4",
            "TRANS_ENERGY_DELIVERED_KWH": 12.5,
            "TRANSACTION_TIME_H_M": "1:45",
            "CARDID": "ABC12DEF34",
            "CUSTOMERS_IDX": 42,
            "CHANNEL": 1,
            "UNUSED_COLUMN": null
        }))
        .unwrap();

        assert_eq!(row.power_kw, Some(Scalar::Text("7,4".into())));
        assert_eq!(row.session_energy_kwh, Some(Scalar::Float(12.5)));
        assert_eq!(row.customer_id, Some(Scalar::Int(42)));
        assert_eq!(row.card_id.and_then(|c| c.as_text()).as_deref(), Some("ABC12DEF34"));
    }

    #[test]
    fn empty_text_scalar_is_absent() {
        assert_eq!(Scalar::Text("  ".into()).as_text(), None);
        assert_eq!(Scalar::Int(7).as_text().as_deref(), Some("7"));
    }
}
