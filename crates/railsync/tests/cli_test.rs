//! Integration tests for the `railsync` CLI binary.
//!
//! Argument parsing, help output, completions, and error handling run
//! without a controller; the command tests point the binary at wiremock.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `railsync` binary with env isolation.
///
/// Clears all `RAILSYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn railsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("railsync");
    cmd.env("HOME", "/tmp/railsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/railsync-cli-test-nonexistent")
        .env_remove("RAILSYNC_PROFILE")
        .env_remove("RAILSYNC_CONTROLLER")
        .env_remove("RAILSYNC_OUTPUT")
        .env_remove("RAILSYNC_INSECURE")
        .env_remove("RAILSYNC_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so wiremock keeps serving.
async fn run_against(server: &MockServer, args: &[&str]) -> std::process::Output {
    let mut cmd = railsync_cmd();
    cmd.args(["--controller", &server.uri()]).args(args);
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = railsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    railsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("model-railroad")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("throttle"))
            .and(predicate::str::contains("accessory")),
    );
}

#[test]
fn test_version_flag() {
    railsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("railsync"));
}

#[test]
fn test_invalid_subcommand() {
    railsync_cmd()
        .arg("levitate")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_speed_out_of_range_is_a_usage_error() {
    railsync_cmd()
        .args(["throttle", "3", "--speed", "150"])
        .assert()
        .failure()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    railsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    railsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    railsync_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("railsync"));
}

// ── Configuration errors ────────────────────────────────────────────

#[test]
fn test_no_controller_configured() {
    let output = railsync_cmd().arg("connections").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("No controller configured"),
        "Expected config error in output:\n{text}"
    );
}

#[test]
fn test_unknown_profile() {
    let output = railsync_cmd()
        .args(["--profile", "club", "connections"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("Profile 'club' not found"));
}

#[test]
fn test_profile_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("railsync");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[profiles.layout]\ncontroller = \"ftp://layout.local\"\n",
    )
    .unwrap();

    let output = railsync_cmd()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["--profile", "layout", "connections"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Invalid value for controller"));
}

// ── Against a mock controller ───────────────────────────────────────

#[tokio::test]
async fn test_connections_plain_lists_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "connections": [
            { "id": "cs1", "systemType": "xnet-elite", "connected": true },
            { "id": "z21", "systemType": "z21", "connected": false }
        ]})))
        .mount(&server)
        .await;

    let output = run_against(&server, &["connections", "-o", "plain"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "cs1\nz21\n");
}

#[tokio::test]
async fn test_throttle_drives_and_reports_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/throttles"))
        .and(query_param("address", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cs1:3:false" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/throttles/cs1:3:false/speed"))
        .and(query_param("value", "0.25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/throttles/cs1:3:false/function"))
        .and(query_param("number", "0"))
        .and(query_param("on", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let output = run_against(
        &server,
        &["throttle", "3", "--speed", "25", "-f", "0=on", "-o", "json-compact"],
    )
    .await;
    assert!(output.status.success(), "{}", combined_output(&output));

    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["throttle_id"], "cs1:3:false");
    assert_eq!(body["state"]["speed"], 0.25);
    assert_eq!(body["state"]["functions"]["0"], true);
}

#[tokio::test]
async fn test_rejected_accessory_exits_with_controller_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/accessories"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "error": "No accessory controller configured" })),
        )
        .mount(&server)
        .await;

    let output = run_against(&server, &["accessory", "12", "thrown"]).await;
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("No accessory controller configured"));
}
