//! End-to-end tests for the `exp-backoff` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

/// Command running inside an empty directory with a clean environment
fn exp_backoff(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("exp-backoff").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("EXP_BACKOFF_CONFIG_FILE")
        .env_remove("SQS_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn in_memory_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("consumer.yaml");
    std::fs::write(
        &path,
        r#"
consumer:
  queue: demo
  factor: 2
  concurrency: 2
  empty_poll_pause_ms: 50
queue:
  provider: in_memory
logging:
  level: warn
"#,
    )
    .unwrap();
    path
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();

    exp_backoff(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("delay"));
}

#[test]
fn test_delay_prints_schedule() {
    let dir = TempDir::new().unwrap();

    exp_backoff(&dir)
        .args(["delay", "--factor", "3", "--retries", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5\t243"));
}

#[test]
fn test_delay_json_output() {
    let dir = TempDir::new().unwrap();

    let output = exp_backoff(&dir)
        .args(["delay", "--factor", "2", "--retries", "3", "--format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let schedule: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(schedule[3]["delay_seconds"], 8);
}

#[test]
fn test_zero_factor_is_an_invalid_argument() {
    let dir = TempDir::new().unwrap();

    exp_backoff(&dir)
        .args(["delay", "--factor", "0"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("factor"));
}

#[test]
fn test_oversized_retries_rejected_without_output() {
    let dir = TempDir::new().unwrap();

    exp_backoff(&dir)
        .args(["delay", "--retries", "4294967295"])
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("retries"));
}

#[test]
fn test_config_show_prints_resolved_configuration() {
    let dir = TempDir::new().unwrap();
    let config = in_memory_config(&dir);

    exp_backoff(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "--show", "--format", "json"])
        .env("EXP_BACKOFF__CONSUMER__CONCURRENCY", "6")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"queue\": \"demo\""))
        .stdout(predicate::str::contains("\"concurrency\": 6"));
}

#[test]
fn test_config_without_queue_is_invalid() {
    let dir = TempDir::new().unwrap();

    exp_backoff(&dir).arg("config").assert().code(1);
}

#[test]
fn test_missing_config_file_exits_with_configuration_error() {
    let dir = TempDir::new().unwrap();

    exp_backoff(&dir)
        .args(["--config", "missing.yaml", "config"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing.yaml"));
}

#[test]
fn test_run_processes_seeded_messages() {
    let dir = TempDir::new().unwrap();
    let config = in_memory_config(&dir);

    let output = exp_backoff(&dir)
        .arg("--config")
        .arg(&config)
        .args([
            "run",
            "--duration-secs",
            "2",
            "--max-attempts",
            "1",
            "--seed",
            "hello",
            "--seed",
            "world",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["completed"], 2);
    assert_eq!(stats["supervisor_restarts"], 0);
}
