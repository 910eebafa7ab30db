//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data directory
//! and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "walkguard-cli", "--"])
        .args(args)
        .env("WALKGUARD_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Unique-ish user id per test so runs don't conflict on the one-active-
/// session invariant.
fn test_user(offset: i64) -> i64 {
    10_000 + std::process::id() as i64 * 100 + offset
}

#[test]
fn test_config_list() {
    let (stdout, _, code) = run_cli(&["config", "list"]);
    assert_eq!(code, 0, "config list failed");
    assert!(stdout.contains("countdown_seconds"));
}

#[test]
fn test_config_get() {
    let (_, _, code) = run_cli(&["config", "get", "alert.countdown_seconds"]);
    assert_eq!(code, 0, "config get failed");
}

#[test]
fn test_config_get_unknown_key_fails() {
    let (_, _, code) = run_cli(&["config", "get", "alert.nope"]);
    assert_ne!(code, 0);
}

#[test]
fn test_contact_seed_and_list() {
    let user = test_user(1);
    let user_arg = user.to_string();
    let (_, _, code) = run_cli(&["contact", "seed", "--user", &user_arg, "+15550001"]);
    assert_eq!(code, 0, "contact seed failed");

    let (stdout, _, code) = run_cli(&["contact", "list", "--user", &user_arg]);
    assert_eq!(code, 0, "contact list failed");
    assert!(stdout.contains("+15550001"));
}

#[test]
fn test_session_lifecycle() {
    let user = test_user(2);
    let user_arg = user.to_string();

    let (stdout, stderr, code) = run_cli(&["session", "start", "--user", &user_arg]);
    assert_eq!(code, 0, "session start failed: {stderr}");
    let session: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let session_id = session["id"].as_i64().unwrap().to_string();

    // A second start for the same user must be rejected.
    let (_, stderr, code) = run_cli(&["session", "start", "--user", &user_arg]);
    assert_ne!(code, 0);
    assert!(stderr.contains("active walk session"));

    let (stdout, _, code) = run_cli(&["session", "active", "--user", &user_arg]);
    assert_eq!(code, 0);
    assert!(stdout.contains(&session_id));

    let (stdout, _, code) = run_cli(&["session", "stop", &session_id]);
    assert_eq!(code, 0, "session stop failed");
    assert!(stdout.contains("ended"));

    // Stopping again is an invalid state, not a success.
    let (_, _, code) = run_cli(&["session", "stop", &session_id]);
    assert_ne!(code, 0);
}

#[test]
fn test_instant_alert_and_history() {
    let user = test_user(3);
    let user_arg = user.to_string();
    run_cli(&["contact", "seed", "--user", &user_arg, "+15550009"]);

    let (stdout, stderr, code) = run_cli(&[
        "alert", "submit", "--user", &user_arg, "--kind", "sos", "--confidence", "1.0",
        "--instant",
    ]);
    assert_eq!(code, 0, "instant alert failed: {stderr}");
    let alert: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(alert["status"], "triggered");
    let alert_id = alert["id"].as_i64().unwrap().to_string();

    let (stdout, _, code) = run_cli(&["alert", "history", &alert_id]);
    assert_eq!(code, 0, "alert history failed");
    assert!(stdout.contains("AlertTriggered"));

    let (_, _, code) = run_cli(&["dispatch", "attempts", &alert_id]);
    assert_eq!(code, 0, "dispatch attempts failed");
}

#[test]
fn test_pending_alert_cancel() {
    let user = test_user(4);
    let user_arg = user.to_string();

    let (stdout, stderr, code) = run_cli(&[
        "alert", "submit", "--user", &user_arg, "--kind", "scream", "--confidence", "0.95",
    ]);
    assert_eq!(code, 0, "alert submit failed: {stderr}");
    let alert: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(alert["status"], "pending");
    let alert_id = alert["id"].as_i64().unwrap().to_string();

    let (stdout, _, code) = run_cli(&["alert", "cancel", &alert_id]);
    assert_eq!(code, 0, "alert cancel failed");
    assert!(stdout.contains("cancelled"));
}

#[test]
fn test_below_threshold_submission_is_rejected() {
    let user = test_user(5);
    let user_arg = user.to_string();
    let (_, stderr, code) = run_cli(&[
        "alert", "submit", "--user", &user_arg, "--kind", "sound-anomaly", "--confidence", "0.2",
    ]);
    assert_ne!(code, 0);
    assert!(stderr.contains("threshold"));
}

#[test]
fn test_cancel_unknown_alert_fails() {
    let (_, stderr, code) = run_cli(&["alert", "cancel", "99999999"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_gateway_status() {
    let (_, _, code) = run_cli(&["gateway", "status"]);
    assert_eq!(code, 0, "gateway status failed");
}
