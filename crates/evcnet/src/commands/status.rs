use evcnet_core::Bridge;

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output::{self, StatusRow};

pub async fn handle(args: StatusArgs, bridge: &Bridge, global: &GlobalOpts) -> Result<(), CliError> {
    let polls = bridge.trigger_poll(args.channel).await?;
    let statuses = super::statuses(polls)?;
    let color = output::should_color(global.color);

    let mut out = output::render_list(
        global.output,
        &statuses,
        |s| StatusRow::new(s, color),
        |s| format!("{} {} {}", s.channel, s.state, output::number(s.power_kw)),
    )?;

    if matches!(global.output, crate::cli::OutputFormat::Table) {
        if let Some(spot) = bridge.spot() {
            let name = spot.name.as_deref().unwrap_or("Recharge spot");
            out = format!("{name} ({})\n{out}", spot.id);
        }
    }
    output::print_output(&out, global.quiet);
    Ok(())
}
