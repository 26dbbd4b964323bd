//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use evcnet_core::{ChargerState, StationStatus};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Charger state, colored by severity when `color` is set.
pub fn paint_state(state: ChargerState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        ChargerState::Charging => text.green().bold().to_string(),
        ChargerState::Available | ChargerState::Full => text.cyan().to_string(),
        ChargerState::Reserved | ChargerState::Blocked => text.yellow().to_string(),
        ChargerState::Fault | ChargerState::NoCommunication => text.red().bold().to_string(),
        ChargerState::Unknown => text.dimmed().to_string(),
    }
}

/// `7.40`, or `-` when absent.
pub fn number(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.2}"))
}

// ── Status rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct StatusRow {
    #[tabled(rename = "Ch")]
    pub channel: u8,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Status")]
    pub label: String,
    #[tabled(rename = "Power (kW)")]
    pub power: String,
    #[tabled(rename = "Session (kWh)")]
    pub session: String,
    #[tabled(rename = "Time (h)")]
    pub hours: String,
    #[tabled(rename = "Total (kWh)")]
    pub total: String,
}

impl StatusRow {
    pub fn new(status: &StationStatus, color: bool) -> Self {
        Self {
            channel: status.channel.get(),
            state: paint_state(status.state, color),
            label: status.status_label.clone(),
            power: number(status.power_kw),
            session: number(status.session_energy_kwh),
            hours: number(status.session_hours),
            total: number(status.total_energy_kwh),
        }
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(plain_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single item in the chosen format.
///
/// Table output uses `detail_fn`, since single-item views have their own
/// layout.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => plain_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_fixed_precision_or_dash() {
        assert_eq!(number(Some(7.4)), "7.40");
        assert_eq!(number(None), "-");
    }

    #[test]
    fn uncolored_state_is_plain_text() {
        assert_eq!(paint_state(ChargerState::NoCommunication, false), "no_communication");
        assert_ne!(paint_state(ChargerState::Charging, true), "charging");
    }
}
