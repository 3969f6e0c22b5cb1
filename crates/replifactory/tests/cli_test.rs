//! Integration tests for the `replifactory` CLI binary.
//!
//! Argument parsing, help output, completions and error handling; no
//! backend is needed except where a test starts its own.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// The binary with an isolated environment: no `REPLIFACTORY_*` vars and
/// config directories pointed at `home`.
fn replifactory_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("replifactory");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("REPLIFACTORY_PROFILE")
        .env_remove("REPLIFACTORY_GATEWAY")
        .env_remove("REPLIFACTORY_OUTPUT")
        .env_remove("REPLIFACTORY_TIMEOUT")
        .env_remove("REPLIFACTORY_TUNNEL_AUTHTOKEN")
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
    let output = replifactory_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_command_groups() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("device")
                .and(predicate::str::contains("experiments"))
                .and(predicate::str::contains("plot"))
                .and(predicate::str::contains("tunnel")),
        );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("replifactory"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_prints_toml_file() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_without_file_renders_defaults() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[proxy]").and(predicate::str::contains("port = 3000")));
}

#[test]
fn test_config_show_json() {
    let home = tempfile::tempdir().unwrap();
    let output = replifactory_cmd(home.path())
        .args(["--output", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["proxy"]["prefix"], "/api");
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = tempfile::tempdir().unwrap();
    let output = replifactory_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("unrecognized") || text.contains("foobar"), "{text}");
}

#[test]
fn test_device_show_without_gateway_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["device", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No gateway configured"));
}

#[test]
fn test_unknown_profile_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["--profile", "lab", "host"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("lab"));
}

#[test]
fn test_invalid_gateway_url() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["--gateway", "not a url", "host"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("gateway"));
}

#[test]
fn test_unreachable_backend_is_connection_error() {
    let home = tempfile::tempdir().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    replifactory_cmd(home.path())
        .args(["--gateway", &format!("http://{addr}/api"), "--timeout", "5", "host"])
        .assert()
        .code(7);
}

#[test]
fn test_simulation_hours_are_validated_locally() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args([
            "--gateway",
            "http://127.0.0.1:9/api",
            "experiments",
            "simulate",
            "1",
            "--hours",
            "500",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("simulation"));
}

#[test]
fn test_invalid_output_format() {
    let home = tempfile::tempdir().unwrap();
    let output = replifactory_cmd(home.path())
        .args(["--output", "invalid", "device", "show"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("invalid") || text.contains("possible values"), "{text}");
}

// ── Subcommand discovery ────────────────────────────────────────────

#[test]
fn test_device_subcommands_exist() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["device", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("set-state")
                .and(predicate::str::contains("measure-ods"))
                .and(predicate::str::contains("od-cal"))
                .and(predicate::str::contains("pump-calibrate"))
                .and(predicate::str::contains("valve-calibrate"))
                .and(predicate::str::contains("od-test"))
                .and(predicate::str::contains("stirrer-test")),
        );
}

#[test]
fn test_experiments_subcommands_exist() {
    let home = tempfile::tempdir().unwrap();
    replifactory_cmd(home.path())
        .args(["experiments", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("create")
                .and(predicate::str::contains("select"))
                .and(predicate::str::contains("simulate")),
        );
}
