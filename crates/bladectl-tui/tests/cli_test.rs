//! Integration tests for the `bladectl` binary.
//!
//! These only exercise argument handling and config resolution; nothing
//! here enters the terminal UI.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `bladectl` binary with env isolation.
///
/// Clears `BLADECTL_*` overrides and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn bladectl_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("bladectl");
    cmd.env("HOME", "/tmp/bladectl-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/bladectl-test-nonexistent")
        .env_remove("BLADECTL_CONFIG")
        .env_remove("BLADECTL_RECONCILER__SLOTS")
        .env_remove("BLADECTL_RECONCILER__STEP")
        .env_remove("BLADECTL_RECONCILER__TOLERANCE")
        .env_remove("BLADECTL_SIMULATOR__LATENCY_MS")
        .env_remove("RUST_LOG");
    cmd
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    bladectl_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("--config")
            .and(predicate::str::contains("--print-config"))
            .and(predicate::str::contains("--log-file")),
    );
}

#[test]
fn test_version_flag() {
    bladectl_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bladectl"));
}

#[test]
fn test_unknown_flag_fails() {
    bladectl_cmd()
        .arg("--no-such-flag")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unexpected argument"));
}

// ── Config resolution ───────────────────────────────────────────────

#[test]
fn test_print_config_defaults() {
    bladectl_cmd()
        .arg("--print-config")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[reconciler]")
                .and(predicate::str::contains("slots = 4"))
                .and(predicate::str::contains("autorepeat_interval_ms = 20"))
                .and(predicate::str::contains("[simulator]"))
                .and(predicate::str::contains("initial_saturation = 0.5")),
        );
}

#[test]
fn test_print_config_reads_file_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bladectl.toml");
    std::fs::write(&path, "[reconciler]\nslots = 6\nstep = 0.05\n").unwrap();

    bladectl_cmd()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .env("BLADECTL_RECONCILER__STEP", "0.02")
        .assert()
        .success()
        .stdout(predicate::str::contains("slots = 6").and(predicate::str::contains("step = 0.02")));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bladectl.toml");
    std::fs::write(&path, "[reconciler]\nslots = 0\n").unwrap();

    bladectl_cmd()
        .arg("--config")
        .arg(&path)
        .arg("--print-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("reconciler.slots"));
}

#[test]
fn test_write_config_saves_effective_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("bladectl.toml");

    bladectl_cmd()
        .arg("--config")
        .arg(&path)
        .arg("--write-config")
        .env("BLADECTL_RECONCILER__SLOTS", "3")
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[reconciler]"));
    assert!(written.contains("slots = 3"));
}
