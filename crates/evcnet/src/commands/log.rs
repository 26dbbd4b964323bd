use evcnet_core::Bridge;

use crate::cli::{GlobalOpts, LogArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: LogArgs, bridge: &Bridge, global: &GlobalOpts) -> Result<(), CliError> {
    let mut polls = bridge.trigger_poll(Some(args.channel)).await?;
    let Some(poll) = polls.pop() else {
        return Ok(());
    };
    let summary = poll.log?;

    let out = output::render_single(
        global.output,
        summary.as_ref(),
        |s| {
            if s.entries.is_empty() {
                format!("No charging sessions on channel {}", s.channel)
            } else {
                s.table.clone()
            }
        },
        |s| {
            s.entries
                .iter()
                .map(|e| {
                    format!(
                        "{}\t{}\t{}",
                        e.started,
                        output::number(e.energy_kwh),
                        output::number(e.duration_hours)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
