//! CLI integration tests

use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    let mut full = vec!["run", "-q", "-p", "hvac-cli", "--"];
    full.extend_from_slice(args);
    Command::new("cargo")
        .args(&full)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Predictive HVAC"), "Should show app name");
    assert!(stdout.contains("train"), "Should show train command");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("sensors"), "Should show sensors command");
    assert!(stdout.contains("learn"), "Should show learn command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("hvacctl"), "Should show binary name");
}

#[test]
fn test_predict_help() {
    let output = run_cli(&["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Predict help should succeed");
    for flag in ["--temperature", "--humidity", "--co2", "--occupancy", "--setpoint", "--deadband"] {
        assert!(stdout.contains(flag), "Should show {} option", flag);
    }
}

#[test]
fn test_train_help_lists_forest_settings() {
    let output = run_cli(&["train", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Train help should succeed");
    for flag in ["--n-estimators", "--seed", "--holdout-fraction", "--max-depth"] {
        assert!(stdout.contains(flag), "Should show {} option", flag);
    }
    assert!(stdout.contains("HVAC_TRAINING__N_ESTIMATORS"), "Should name the agent's env var");
}

#[test]
fn test_learn_help() {
    let output = run_cli(&["learn", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Learn help should succeed");
    assert!(stdout.contains("--desired"), "Should show desired option");
    assert!(stdout.contains("--local"), "Should show local option");
}

#[test]
fn test_occupancy_out_of_range_rejected() {
    let output = run_cli(&[
        "predict",
        "--temperature",
        "23",
        "--humidity",
        "40",
        "--co2",
        "500",
        "--occupancy",
        "2",
    ]);

    assert!(!output.status.success(), "Occupancy 2 should be rejected");
}

#[test]
fn test_learn_requires_desired() {
    let output = run_cli(&["learn", "--temperature", "23", "--humidity", "40", "--co2", "500"]);

    assert!(!output.status.success(), "Learn without --desired should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--desired"));
}

#[test]
fn test_train_without_dataset_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let dataset = dir.path().join("missing.csv");
    let models = dir.path().join("models");

    let output = run_cli(&[
        "--dataset",
        dataset.to_str().unwrap(),
        "--model-dir",
        models.to_str().unwrap(),
        "train",
    ]);

    assert!(!output.status.success(), "Training without a dataset should fail");
}
