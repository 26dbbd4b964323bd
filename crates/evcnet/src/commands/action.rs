use evcnet_core::{ActionOverrides, Bridge};
use tabled::{Table, settings::Style};

use crate::cli::{ActionArgs, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, StatusRow};

pub async fn handle(args: ActionArgs, bridge: &Bridge, global: &GlobalOpts) -> Result<(), CliError> {
    let overrides = ActionOverrides {
        card_id: args.card_id,
        customer_id: args.customer_id,
    };
    let ack = bridge.trigger_action(args.action, args.channel, &overrides).await?;
    let color = output::should_color(global.color);

    let out = output::render_single(
        global.output,
        &ack,
        |ack| {
            let mut text = format!("{} accepted on channel {}", ack.action, ack.channel);
            if let Some(message) = ack.message.as_deref().filter(|m| !m.is_empty()) {
                text.push_str(": ");
                text.push_str(message);
            }
            if let Some(status) = &ack.status {
                let table = Table::new([StatusRow::new(status, color)])
                    .with(Style::rounded())
                    .to_string();
                text = format!("{text}\n{table}");
            }
            text
        },
        |ack| ack.status.as_ref().map_or_else(|| "ok".into(), |s| s.state.to_string()),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
