//! Integration tests for the `warden-echo` command surface.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn unknown_command_is_rejected() {
    let workspace = TempDir::new().expect("temp dir");
    let mut command = cargo_bin_cmd!("warden-echo");
    command
        .current_dir(workspace.path())
        .env("WARDEN_WORKING_DIRECTORY", workspace.path())
        .arg("bogus");
    command.assert().failure().stderr(contains(
        "Invalid command. Please specify start, restart, stop or status.",
    ));
}

#[test]
fn status_of_a_fresh_directory_is_stopped() {
    let workspace = TempDir::new().expect("temp dir");
    let mut command = cargo_bin_cmd!("warden-echo");
    command
        .current_dir(workspace.path())
        .env("WARDEN_WORKING_DIRECTORY", workspace.path())
        .arg("status");
    command
        .assert()
        .success()
        .stdout(contains("Daemon status: stopped"));
}

#[test]
fn status_loads_built_in_defaults_in_a_clean_environment() {
    let workspace = TempDir::new().expect("temp dir");
    let mut command = cargo_bin_cmd!("warden-echo");
    command
        .current_dir(workspace.path())
        .env_clear()
        .env("PATH", std::env::var_os("PATH").unwrap_or_default())
        .env("HOME", workspace.path())
        .arg("status");
    command
        .assert()
        .success()
        .stdout(contains("Daemon status: stopped"))
        .stderr(contains("failed to load configuration").not());
}

#[test]
fn stop_without_a_pid_file_reports_it() {
    let workspace = TempDir::new().expect("temp dir");
    let mut command = cargo_bin_cmd!("warden-echo");
    command
        .current_dir(workspace.path())
        .env("WARDEN_WORKING_DIRECTORY", workspace.path())
        .arg("stop");
    command
        .assert()
        .success()
        .stdout(contains("Stopping warden-echo daemon..."))
        .stderr(contains("Pid file not found. Is the daemon running?"));
}

#[test]
fn missing_command_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("warden-echo");
    command.assert().failure().stderr(contains("COMMAND"));
}
