//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory and
//! verify its outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command with `home` as the data directory and return output.
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_flowfocus"))
        .args(args)
        .env("FLOWFOCUS_HOME", home)
        .env_remove("FLOWFOCUS_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

/// The last JSON document printed on stdout.
fn last_json(stdout: &str) -> serde_json::Value {
    let start = stdout.rfind("\n{").map(|i| i + 1).unwrap_or(0);
    serde_json::from_str(&stdout[start..]).expect("stdout ends with a JSON document")
}

#[test]
fn test_timer_status_defaults() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    assert_eq!(code, 0);

    let json = last_json(&stdout);
    assert_eq!(json["type"], "state_snapshot");
    assert_eq!(json["state"]["timeRemaining"], 1500);
    assert_eq!(json["state"]["currentSession"], 1);
    assert_eq!(json["state"]["currentSessionType"], "focus");
    assert_eq!(json["state"]["isRunning"], false);
}

#[test]
fn test_timer_start_pause_resume() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(home.path(), &["timer", "start"]);
    assert_eq!(code, 0);
    assert_eq!(last_json(&stdout)["type"], "timer_started");

    let (code, stdout, _) = run_cli(home.path(), &["timer", "pause"]);
    assert_eq!(code, 0);
    assert_eq!(last_json(&stdout)["type"], "timer_paused");

    let (_, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    let json = last_json(&stdout);
    assert_eq!(json["state"]["isRunning"], true);
    assert_eq!(json["state"]["isPaused"], true);

    let (code, stdout, _) = run_cli(home.path(), &["timer", "resume"]);
    assert_eq!(code, 0);
    assert_eq!(last_json(&stdout)["type"], "timer_resumed");
}

#[test]
fn test_timer_skip_and_reset() {
    let home = tempfile::tempdir().unwrap();

    let (_, stdout, _) = run_cli(home.path(), &["timer", "skip"]);
    let json = last_json(&stdout);
    assert_eq!(json["type"], "timer_skipped");
    assert_eq!(json["to"], "shortBreak");

    let (_, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    assert_eq!(last_json(&stdout)["state"]["timeRemaining"], 300);

    let (_, stdout, _) = run_cli(home.path(), &["timer", "reset"]);
    assert_eq!(last_json(&stdout)["type"], "timer_reset");

    let (_, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    let json = last_json(&stdout);
    assert_eq!(json["state"]["currentSessionType"], "focus");
    assert_eq!(json["state"]["timeRemaining"], 1500);
}

#[test]
fn test_config_changes_reseed_idle_timer() {
    let home = tempfile::tempdir().unwrap();

    // Store a snapshot under the default lengths first.
    let (_, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    assert_eq!(last_json(&stdout)["state"]["timeRemaining"], 1500);

    let (code, stdout, _) = run_cli(home.path(), &["config", "set", "schedule.focus_duration", "50"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "schedule.focus_duration"]);
    assert_eq!(stdout.trim(), "50");

    let (_, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    assert_eq!(last_json(&stdout)["state"]["timeRemaining"], 3000);

    // A paused session is re-seeded too.
    run_cli(home.path(), &["timer", "start"]);
    run_cli(home.path(), &["timer", "pause"]);
    let (code, _, _) = run_cli(home.path(), &["config", "set", "schedule.focus_duration", "30"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["timer", "status"]);
    let json = last_json(&stdout);
    assert_eq!(json["state"]["isPaused"], true);
    assert_eq!(json["state"]["timeRemaining"], 1800);
}

#[test]
fn test_config_list_and_unknown_key() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("schedule.sessions_before_long_break = 4"));

    let (code, _, stderr) = run_cli(home.path(), &["config", "get", "schedule.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (code, _, stderr) = run_cli(home.path(), &["config", "set", "notifications.desktop", "maybe"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_history_starts_empty() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(home.path(), &["history"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("no completed sessions"));

    let (code, stdout, _) = run_cli(home.path(), &["history", "--json", "--limit", "5"]);
    assert_eq!(code, 0);
    assert_eq!(serde_json::from_str::<serde_json::Value>(&stdout).unwrap(), serde_json::json!([]));
}

#[test]
fn test_corrupt_database_is_reported() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["timer", "start"]);
    assert_eq!(code, 0);

    // Overwrite the database file with garbage; the CLI must fail loudly
    // rather than silently losing history.
    std::fs::write(home.path().join("flowfocus.db"), b"not a database").unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["timer", "status"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}
