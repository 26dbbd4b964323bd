//! Config subcommand handlers.

use std::fmt::Write;
use std::path::PathBuf;

use evcnet_config::FileConfig;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Format config for display, masking the password.
fn format_config_redacted(cfg: &FileConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "base_url = \"{}\"", cfg.base_url);
    if let Some(ref email) = cfg.email {
        let _ = writeln!(out, "email = \"{email}\"");
    }
    if cfg.password.is_some() {
        let _ = writeln!(out, "password = \"****\"");
    }
    for (key, value) in [
        ("card_id", &cfg.card_id),
        ("customer_id", &cfg.customer_id),
        ("spot_id", &cfg.spot_id),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "{key} = \"{value}\"");
        }
    }
    let _ = writeln!(out, "max_channels = {}", cfg.max_channels);
    let _ = writeln!(out, "log_limit = {}", cfg.log_limit);
    let _ = writeln!(out, "timeout = {}", cfg.timeout);
    let _ = writeln!(out, "settle_delay = {}", cfg.settle_delay);
    let _ = writeln!(out, "decimal_mark = \"{}\"", cfg.decimal_mark);
    let _ = writeln!(out);
    let _ = writeln!(out, "[retry]");
    let _ = writeln!(out, "max_retries = {}", cfg.retry.max_retries);
    let _ = writeln!(out, "initial_delay_ms = {}", cfg.retry.initial_delay_ms);
    let _ = write!(out, "max_delay_ms = {}", cfg.retry.max_delay_ms);
    out
}

fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(evcnet_config::config_path)
}

fn prompt_password(email: &str) -> Result<String, CliError> {
    let password = rpassword::prompt_password(format!("Password for {email}: "))?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(password)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_path(global);
    match args.command {
        ConfigCommand::Init {
            email,
            base_url,
            card_id,
            customer_id,
            max_channels,
            store_password,
        } => {
            let mut cfg = FileConfig {
                email: Some(email.clone()),
                card_id,
                customer_id,
                ..FileConfig::default()
            };
            if let Some(url) = base_url {
                cfg.base_url = evcnet_config::parse_base_url(&url)?.to_string();
            }
            if let Some(n) = max_channels {
                cfg.max_channels = n;
            }
            evcnet_config::save_config(&cfg, &path)?;
            output::print_output(&format!("Wrote {}", path.display()), global.quiet);

            if store_password {
                let password = prompt_password(&email)?;
                evcnet_config::store_password(&email, &password)?;
                output::print_output("Password stored in the system keyring", global.quiet);
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = evcnet_config::load_config_from(&path)?;
            output::print_output(&format_config_redacted(&cfg), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = evcnet_config::load_config_from(&path)?;
            let email = cfg.email.ok_or_else(|| CliError::NoConfig {
                path: path.display().to_string(),
            })?;
            let password = prompt_password(&email)?;
            evcnet_config::store_password(&email, &password)?;
            output::print_output("Password stored in the system keyring", global.quiet);
            Ok(())
        }
    }
}
