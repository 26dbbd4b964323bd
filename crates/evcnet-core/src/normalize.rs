// ── Value normalization ──
//
// The portal renders numbers in the account's locale ("1.234,56" or
// "1234.56"), sometimes with a unit suffix, and durations as `H:MM`.
// Everything here is pure and total: unparsable input yields `None`.

use evcnet_api::Scalar;
use serde::{Deserialize, Serialize};

/// Decimal separator of the portal's locale.
///
/// Only matters for a number with a single separator: `"1.234"` is
/// `1.234` under `Auto` or `Period` and `1234` under `Comma`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecimalMark {
    /// Treat a single separator as the decimal mark.
    #[default]
    Auto,
    Comma,
    Period,
}

/// Parse a locale-formatted decimal.
///
/// When both separators appear the later one is the decimal mark. A lone
/// separator repeated more than once is a thousands separator. A single
/// one is the decimal mark unless `mark` names the other separator.
pub fn parse_locale_number(raw: &str, mark: DecimalMark) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '\u{a0}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let canonical = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() > 1 || mark == DecimalMark::Period => {
            cleaned.replace(',', "")
        }
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if cleaned.matches('.').count() > 1 || mark == DecimalMark::Comma => {
            cleaned.replace('.', "")
        }
        _ => cleaned,
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split `"7,4 kW"` into the number and an optional unit.
pub fn parse_quantity(raw: &str, mark: DecimalMark) -> Option<(f64, Option<&str>)> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let unit = unit.trim();
    let value = parse_locale_number(number, mark)?;
    Some((value, (!unit.is_empty()).then_some(unit)))
}

/// Numeric value of a loosely typed scalar.
pub fn scalar_number(value: &Scalar, mark: DecimalMark) -> Option<f64> {
    scalar_quantity(value, mark).map(|(v, _)| v)
}

fn scalar_quantity(value: &Scalar, mark: DecimalMark) -> Option<(f64, Option<String>)> {
    match value {
        Scalar::Int(v) => Some((int_to_f64(*v), None)),
        Scalar::Float(v) => v.is_finite().then_some((*v, None)),
        Scalar::Text(text) => parse_quantity(text, mark).map(|(v, u)| (v, u.map(String::from))),
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn int_to_f64(v: i64) -> f64 {
    v as f64
}

/// Power in kW. `default_unit` applies when the value carries none.
pub fn power_kw(value: &Scalar, default_unit: &str, mark: DecimalMark) -> Option<f64> {
    let (number, unit) = scalar_quantity(value, mark)?;
    let factor = match unit.as_deref().unwrap_or(default_unit).to_ascii_lowercase().as_str() {
        "w" => 0.001,
        "kw" => 1.0,
        "mw" => 1000.0,
        _ => return None,
    };
    Some(number * factor)
}

/// Energy in kWh. `default_unit` applies when the value carries none.
pub fn energy_kwh(value: &Scalar, default_unit: &str, mark: DecimalMark) -> Option<f64> {
    let (number, unit) = scalar_quantity(value, mark)?;
    energy_in_kwh(number, unit.as_deref().unwrap_or(default_unit))
}

pub fn energy_in_kwh(number: f64, unit: &str) -> Option<f64> {
    let factor = match unit.trim().to_ascii_lowercase().as_str() {
        "wh" => 0.001,
        "kwh" => 1.0,
        "mwh" => 1000.0,
        _ => return None,
    };
    Some(number * factor)
}

/// Duration in decimal hours from `H:MM`, `H:MM:SS`, or a bare number of hours.
pub fn duration_hours(value: &Scalar, mark: DecimalMark) -> Option<f64> {
    let Scalar::Text(text) = value else {
        return scalar_number(value, mark);
    };
    let text = text.trim();
    if !text.contains(':') {
        return parse_locale_number(text, mark);
    }

    let parts = text
        .split(':')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(f64::from(hours) + f64::from(minutes) / 60.0 + f64::from(seconds) / 3600.0)
}
