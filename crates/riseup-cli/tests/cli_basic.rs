//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data
//! directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_riseup"))
        .args(args)
        .env("RISEUP_DATA_DIR", data_dir)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("stdout is JSON")
}

#[test]
fn first_show_is_disabled_default() {
    let dir = tempfile::tempdir().unwrap();
    let alarm = run_json(dir.path(), &["alarm", "show"]);
    assert_eq!(alarm["is_enabled"], false);
    assert!(alarm["formatted_time"].as_str().unwrap().ends_with(":00 AM")
        || alarm["formatted_time"].as_str().unwrap().ends_with(":00 PM"));
}

#[test]
fn set_persists_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let set = run_json(dir.path(), &["alarm", "set", "07:15"]);
    assert_eq!(set["formatted_time"], "7:15 AM");
    assert_eq!(set["is_enabled"], true);

    let shown = run_json(dir.path(), &["alarm", "show"]);
    assert_eq!(shown["id"], set["id"]);
    assert_eq!(shown["formatted_time"], "7:15 AM");

    let disabled = run_json(dir.path(), &["alarm", "disable"]);
    assert_eq!(disabled["is_enabled"], false);
    assert_eq!(disabled["id"], set["id"]);
}

#[test]
fn set_accepts_twelve_hour_input() {
    let dir = tempfile::tempdir().unwrap();
    let set = run_json(dir.path(), &["alarm", "set", "6:05 pm", "--disabled"]);
    assert_eq!(set["formatted_time"], "6:05 PM");
    assert_eq!(set["is_enabled"], false);
}

#[test]
fn invalid_time_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["alarm", "set", "25:99"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn config_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "ringing.step_goal"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "20");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "ringing.step_goal", "35"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(dir.path(), &["config", "get", "ringing.step_goal"]);
    assert_eq!(stdout.trim(), "35");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "smart_alarm.max_horizon_hours", "48"]);
    assert_eq!(code, 1);

    let (_, _, code) = run_cli(dir.path(), &["config", "reset"]);
    assert_eq!(code, 0);
    let list = run_json(dir.path(), &["config", "list"]);
    assert_eq!(list["ringing"]["step_goal"], 20);
    assert_eq!(list["ringing"]["pattern"], "rapid_fire");
}

#[test]
fn unknown_config_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "ringing.volume"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown config key"));
}

#[test]
fn haptics_plays_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_json(dir.path(), &["haptics", "rapid-fire"]);
    assert_eq!(out["pattern"], "rapid_fire");
    assert_eq!(out["taps"].as_array().unwrap().len(), 6);
}

#[test]
fn run_with_disabled_alarm_exits_with_status() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(dir.path(), &["run"]);
    assert_eq!(status["runner"]["phase"], "idle");
    assert_eq!(status["session"]["phase"], "idle");
}
