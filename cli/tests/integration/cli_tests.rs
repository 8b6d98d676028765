//! Integration tests for the spacecopy CLI surface
//!
//! These tests spawn the binary against a throwaway `CF_HOME`. Every case
//! fails before the first control-plane request, so no platform is needed.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Isolated home directory with an optional cf CLI config.
struct Home {
    dir: TempDir,
}

impl Home {
    fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    /// Home whose cf CLI targets `org`/`space` (empty strings leave them unset).
    fn logged_in(org: &str, space: &str) -> Self {
        let home = Self::empty();
        let cf = home.dir.path().join(".cf");
        std::fs::create_dir_all(&cf).expect("mkdir");
        let guid = |name: &str| {
            if name.is_empty() {
                String::new()
            } else {
                format!("{name}-guid")
            }
        };
        let config = serde_json::json!({
            "ConfigVersion": 3,
            "Target": "https://api.sys.example.com",
            "UaaEndpoint": "https://uaa.sys.example.com",
            "AccessToken": "bearer not-a-jwt",
            "RefreshToken": "refresh",
            "OrganizationFields": {"GUID": guid(org), "Name": org},
            "SpaceFields": {"GUID": guid(space), "Name": space}
        });
        std::fs::write(cf.join("config.json"), config.to_string()).expect("write");
        home
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn spacecopy(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("spacecopy"));
        cmd.env("NO_COLOR", "1")
            .env("CF_HOME", self.path())
            .env("HOME", self.path())
            .env("SPACECOPY_CONFIG", self.path().join("spacecopy.yaml"))
            .env_remove("RUST_LOG")
            .env_remove("CF_TRACE");
        cmd
    }
}

fn json_error(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout is one JSON document")
}

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    Home::empty()
        .spacecopy()
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "Copy applications and services between Cloud Foundry spaces",
        ));
}

#[test]
fn test_cli_help_lists_commands() {
    Home::empty()
        .spacecopy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    Home::empty()
        .spacecopy()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spacecopy 0.1.0"));
}

#[test]
fn test_version_command_human_and_json() {
    let home = Home::empty();
    home.spacecopy()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spacecopy v0.1.0"));
    home.spacecopy()
        .args(["version", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"version":"0.1.0"}"#));
}

#[test]
fn test_copy_help_documents_flags() {
    let assert = Home::empty()
        .spacecopy()
        .args(["copy", "--help"])
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for flag in [
        "--apps",
        "--host-format",
        "--domain",
        "--droplet",
        "--ups",
        "--service-types",
        "--services-only",
        "--keep-existing-services",
        "<DEST_SPACE>",
        "[DEST_ORG]",
        "[DEST_TARGET]",
    ] {
        assert!(out.contains(flag), "missing {flag} in:\n{out}");
    }
}

#[test]
fn test_copy_requires_destination_space() {
    Home::empty()
        .spacecopy()
        .arg("copy")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("<DEST_SPACE>"));
}

// --- Early failures ---

#[test]
fn test_copy_without_cf_login_fails() {
    Home::empty()
        .spacecopy()
        .args(["copy", "qa", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("config.json"));
}

#[test]
fn test_copy_without_targeted_space_is_no_target() {
    let home = Home::logged_in("acme", "");
    let assert = home
        .spacecopy()
        .args(["copy", "qa", "--json"])
        .assert()
        .failure();
    let v = json_error(&assert.get_output().stdout);
    assert_eq!(v["error"], true);
    assert_eq!(v["code"], "NO_TARGET");
}

#[test]
fn test_copy_to_current_space_is_rejected() {
    let home = Home::logged_in("acme", "dev");
    let assert = home
        .spacecopy()
        .args(["copy", "dev", "acme", "--json"])
        .assert()
        .failure();
    let v = json_error(&assert.get_output().stdout);
    assert_eq!(v["code"], "SAME_SOURCE_AND_DESTINATION");
}

#[test]
fn test_copy_to_unknown_target_is_target_not_found() {
    let home = Home::logged_in("acme", "dev");
    let assert = home
        .spacecopy()
        .args(["copy", "dev", "acme", "apac", "--json"])
        .assert()
        .failure();
    let v = json_error(&assert.get_output().stdout);
    assert_eq!(v["code"], "TARGET_NOT_FOUND");
    assert!(v["message"].as_str().unwrap().contains("apac"));
}

#[test]
fn test_copy_with_invalid_host_format_fails_before_login_check() {
    let assert = Home::empty()
        .spacecopy()
        .args(["copy", "qa", "-n", "{{.region}}", "--json"])
        .assert()
        .failure();
    let v = json_error(&assert.get_output().stdout);
    assert_eq!(v["code"], "INVALID_HOST_FORMAT");
}

#[test]
fn test_human_error_goes_to_stderr_only() {
    Home::logged_in("acme", "dev")
        .spacecopy()
        .args(["copy", "dev"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error:").not())
        .stderr(predicate::str::contains("The source and destination are the same."));
}
