//! CLI integration tests

use std::process::Command;

fn modelfox() -> Command {
    Command::new(env!("CARGO_BIN_EXE_modelfox"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = modelfox()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("ModelFox"), "Should show app name");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("log"), "Should show log command");
    assert!(stdout.contains("flush"), "Should show flush command");
    assert!(stdout.contains("status"), "Should show status command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = modelfox()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("modelfox"), "Should show binary name");
}

/// Test that malformed input pairs are rejected before any request is made
#[test]
fn test_cli_rejects_bad_input_pair() {
    let output = modelfox()
        .args(["--server-url", "http://127.0.0.1:1", "predict", "--input", "age"])
        .env("HOME", std::env::temp_dir())
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Bad input should fail");
    assert!(stderr.contains("column=value"), "Should explain the format");
}
