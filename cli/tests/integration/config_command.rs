//! Integration tests for `spacecopy config`.
//!
//! All tests set `SPACECOPY_CONFIG` to a temp path so they never read or
//! write `~/.spacecopy/config.yaml`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn spacecopy(config: &str) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("spacecopy"));
    cmd.env("NO_COLOR", "1").env("SPACECOPY_CONFIG", config);
    cmd
}

/// Returns a `TempDir` and the path string for a config file inside it.
fn temp_config_path() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir
        .path()
        .join("nested")
        .join("config.yaml")
        .to_string_lossy()
        .into_owned();
    (dir, path)
}

#[test]
fn test_config_help_shows_show_and_set_subcommands() {
    let (_dir, path) = temp_config_path();
    spacecopy(&path)
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("set"));
}

#[test]
fn test_config_show_without_file_lists_defaults() {
    let (_dir, path) = temp_config_path();
    spacecopy(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retry.attempts:"))
        .stdout(predicate::str::contains("start.timeout_secs:"))
        .stdout(predicate::str::contains(path.as_str()));
}

#[test]
fn test_config_set_persists_and_show_reads_back() {
    let (_dir, path) = temp_config_path();
    spacecopy(&path)
        .args(["config", "set", "start.timeout_secs", "600"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set start.timeout_secs = 600"));

    let stored = std::fs::read_to_string(&path).expect("config written");
    assert!(stored.contains("timeout_secs: 600"), "got:\n{stored}");

    let assert = spacecopy(&path)
        .args(["config", "show", "--json"])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(v["config"]["start"]["timeout_secs"], 600);
    assert_eq!(v["path"], path.as_str());
}

#[cfg(unix)]
#[test]
fn test_config_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, path) = temp_config_path();
    spacecopy(&path)
        .args(["config", "set", "retry.attempts", "3"])
        .assert()
        .success();
    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_config_set_unknown_key_fails_without_writing() {
    let (_dir, path) = temp_config_path();
    spacecopy(&path)
        .args(["config", "set", "security.level", "strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown setting: security.level"));
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_set_invalid_value_json_error() {
    let (_dir, path) = temp_config_path();
    let assert = spacecopy(&path)
        .args(["config", "set", "retry.attempts", "many", "--json"])
        .assert()
        .failure();
    let v: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(v["error"], true);
    assert_eq!(v["code"], "INVALID_CONFIG");
}
