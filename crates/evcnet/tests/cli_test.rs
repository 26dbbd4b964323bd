//! Integration tests for the `evcnet` CLI binary.
//!
//! Argument parsing, help output, completions, config handling and error
//! exit codes, all without a live portal.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation so tests never touch the user's
/// real configuration, state or keyring-backed password.
fn evcnet_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("evcnet");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("EVCNET_CONFIG")
        .env_remove("EVCNET_STATE")
        .env_remove("EVCNET_OUTPUT")
        .env_remove("EVCNET_EMAIL")
        .env_remove("EVCNET_BASE_URL")
        .env_remove("EVCNET_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = evcnet_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    evcnet_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("status")
            .and(predicate::str::contains("action"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    evcnet_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_unknown_action_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    evcnet_cmd(home.path())
        .args(["action", "explode"])
        .assert()
        .code(2);
}

#[test]
fn test_watch_interval_has_a_floor() {
    let home = tempfile::tempdir().unwrap();
    evcnet_cmd(home.path())
        .args(["watch", "--interval", "1"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_status_without_config_explains_setup() {
    let home = tempfile::tempdir().unwrap();
    let output = evcnet_cmd(home.path()).arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("config init"));
}

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("evcnet.toml");
    let path_arg = path.to_str().unwrap();

    evcnet_cmd(home.path())
        .args([
            "--config",
            path_arg,
            "config",
            "init",
            "--email",
            "owner@example.com",
            "--card-id",
            "ABC12DEF34",
        ])
        .assert()
        .success();
    assert!(path.exists());

    evcnet_cmd(home.path())
        .args(["--config", path_arg, "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("email = \"owner@example.com\"")
                .and(predicate::str::contains("card_id = \"ABC12DEF34\""))
                .and(predicate::str::contains("50five-sbelux.evc-net.com")),
        );
}

#[test]
fn test_config_init_rejects_bad_url() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("evcnet.toml");
    evcnet_cmd(home.path())
        .args([
            "--config",
            path.to_str().unwrap(),
            "config",
            "init",
            "--email",
            "owner@example.com",
            "--base-url",
            "ftp://portal.example.com",
        ])
        .assert()
        .code(2);
    assert!(!path.exists());
}

#[test]
fn test_invalid_channel_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("evcnet.toml");
    std::fs::write(
        &path,
        "base_url = \"http://127.0.0.1:9\"\nemail = \"owner@example.com\"\npassword = \"pw\"\n",
    )
    .unwrap();

    evcnet_cmd(home.path())
        .args(["--config", path.to_str().unwrap(), "status", "--channel", "2"])
        .assert()
        .code(2);
}
