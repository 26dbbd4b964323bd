//! Poll loop: the CLI acting as the bridge's scheduler.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Local;
use evcnet_core::{Bridge, Channel, ChargerState, ErrorKind};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: WatchArgs, bridge: &Bridge, global: &GlobalOpts) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let color = output::should_color(global.color);
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: HashMap<Channel, (ChargerState, Option<String>)> = HashMap::new();

    info!(interval_secs = args.interval, "watching");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let polls = bridge.trigger_poll(args.channel).await?;
        for poll in polls {
            let status = match poll.status {
                Ok(status) => status,
                // Auth and config failures will not fix themselves.
                Err(e) if matches!(e.kind(), ErrorKind::Auth | ErrorKind::Config) => {
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(channel = poll.channel.get(), error = %e, "poll failed, keeping last status");
                    continue;
                }
            };

            let seen = (status.state, status.power_kw.map(|p| format!("{p:.1}")));
            if !args.all && last.get(&poll.channel) == Some(&seen) {
                continue;
            }
            last.insert(poll.channel, seen);

            let line = format!(
                "{} ch{} {} {} kW {}",
                Local::now().format("%H:%M:%S"),
                status.channel,
                output::paint_state(status.state, color),
                output::number(status.power_kw),
                status.status_label,
            );
            output::print_output(&line, global.quiet);
        }
    }

    info!("watch stopped");
    Ok(())
}
