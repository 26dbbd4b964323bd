//! Command handlers.

pub mod action;
pub mod config_cmd;
pub mod log;
pub mod status;
pub mod watch;

use std::sync::Arc;

use evcnet_config::JsonFileStore;
use evcnet_core::{Bridge, ChannelPoll, CoreError, StationStatus};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Build the bridge from the config file and the persisted state.
pub fn open_bridge(global: &GlobalOpts) -> Result<Bridge, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(evcnet_config::config_path);
    let cfg = evcnet_config::load_config_from(&path)?;
    let config = evcnet_config::to_bridge_config(&cfg)?;

    let state = global
        .state
        .clone()
        .unwrap_or_else(evcnet_config::state_path);
    let store = JsonFileStore::open(state)?;

    Ok(Bridge::new(config, Arc::new(store))?)
}

pub async fn dispatch(cmd: Command, bridge: &Bridge, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(args, bridge, global).await,
        Command::Log(args) => log::handle(args, bridge, global).await,
        Command::Action(args) => action::handle(args, bridge, global).await,
        Command::Watch(args) => watch::handle(args, bridge, global).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Successful statuses of a poll. Per-channel failures are reported on
/// stderr; the poll fails only if no channel succeeded.
pub(crate) fn statuses(polls: Vec<ChannelPoll>) -> Result<Vec<Arc<StationStatus>>, CliError> {
    let mut ok = Vec::with_capacity(polls.len());
    let mut first_err: Option<CoreError> = None;
    for poll in polls {
        match poll.status {
            Ok(status) => ok.push(status),
            Err(e) => {
                tracing::warn!(channel = poll.channel.get(), error = %e, "channel poll failed");
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) if ok.is_empty() => Err(e.into()),
        _ => Ok(ok),
    }
}
