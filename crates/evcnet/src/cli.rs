//! Clap derive structures for the `evcnet` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use evcnet_core::Action;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// evcnet -- poll and control an EVC-net charging station
#[derive(Debug, Parser)]
#[command(
    name = "evcnet",
    version,
    about = "Poll and control EVC-net charging stations from the command line",
    long_about = "Talks to the EVC-net charging portal on behalf of one account.\n\n\
        Every command logs in on demand, reuses the persisted session cookie \
        when possible, and prints normalized station data.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "EVCNET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// State file for the session cookie and detected identifiers
    #[arg(long, env = "EVCNET_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EVCNET_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll and show the status of one or all channels
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Poll and show recent charging sessions
    Log(LogArgs),

    /// Send a command to a channel
    #[command(alias = "do")]
    Action(ActionArgs),

    /// Poll on an interval and print status changes until interrupted
    Watch(WatchArgs),

    /// Manage the configuration file and stored password
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Channel to poll (all channels if omitted)
    #[arg(long, short = 'c')]
    pub channel: Option<u8>,
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Channel whose log to show
    #[arg(long, short = 'c', default_value_t = 1)]
    pub channel: u8,
}

#[derive(Debug, Args)]
pub struct ActionArgs {
    /// start, stop, soft_reset, hard_reset, unlock_connector, block, unblock, refresh_status
    pub action: Action,

    /// Channel to act on
    #[arg(long, short = 'c', default_value_t = 1)]
    pub channel: u8,

    /// Card id for this start only
    #[arg(long)]
    pub card_id: Option<String>,

    /// Customer id for this start only
    #[arg(long)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Channel to poll (all channels if omitted)
    #[arg(long, short = 'c')]
    pub channel: Option<u8>,

    /// Seconds between polls
    #[arg(
        long,
        short = 'i',
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(5..)
    )]
    pub interval: u64,

    /// Print every poll, not only changes
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file
    Init {
        /// Account email
        #[arg(long)]
        email: String,

        /// Portal base URL
        #[arg(long)]
        base_url: Option<String>,

        /// RFID card id used for start
        #[arg(long)]
        card_id: Option<String>,

        /// Customer id used for start
        #[arg(long)]
        customer_id: Option<String>,

        /// Number of channels on the station
        #[arg(long)]
        max_channels: Option<u8>,

        /// Prompt for the password and store it in the system keyring
        #[arg(long)]
        store_password: bool,
    },

    /// Show the effective configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Prompt for the password and store it in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
