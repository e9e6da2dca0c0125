//! Tests for agentwatch CLI commands

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();
    (temp_dir, db_path)
}

fn agentwatch(db_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("agentwatch").unwrap();
    cmd.env_remove("AGENTWATCH_POLICY")
        .arg("--db-path")
        .arg(db_path);
    cmd
}

fn add_agent(db_path: &str, id: &str, name: &str) {
    agentwatch(db_path)
        .args(["agent", "add", "--name", name, "--id", id, "--status", "running"])
        .assert()
        .success();
}

#[test]
fn test_agent_add_and_list() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["agent", "add", "--name", "Builder Agent", "--id", "agent-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Agent 'Builder Agent' added with ID agent-1"));

    agentwatch(&db_path)
        .args(["agent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-1"))
        .stdout(predicate::str::contains("idle"));

    agentwatch(&db_path)
        .args(["agent", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Builder Agent\""));
}

#[test]
fn test_agent_list_empty() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["agent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No agents registered"));
}

#[test]
fn test_agent_add_rejects_unknown_status() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["agent", "add", "--name", "x", "--status", "sleeping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown agent status"));
}

#[test]
fn test_agent_status_and_show() {
    let (_temp, db_path) = setup_test_env();
    add_agent(&db_path, "agent-1", "Builder Agent");

    agentwatch(&db_path)
        .args(["agent", "status", "agent-1", "error"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Agent agent-1 is now error"));

    agentwatch(&db_path)
        .args(["record", "event", "--agent", "agent-1", "--type", "error", "--message", "Rate limited"])
        .assert()
        .success();

    agentwatch(&db_path)
        .args(["agent", "show", "agent-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: error"))
        .stdout(predicate::str::contains("Rate limited"));
}

#[test]
fn test_agent_show_unknown_fails() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["agent", "show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Agent not found: ghost"));
}

#[test]
fn test_record_cost_rejects_negative() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["record", "cost", "--agent", "agent-1", "--value=-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("non-negative"));
}

#[test]
fn test_record_task_for_unknown_agent_fails() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["record", "task", "--agent", "ghost", "--title", "Build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Agent not found"));
}

#[test]
fn test_cost_analysis_and_anomalies() {
    let (_temp, db_path) = setup_test_env();
    add_agent(&db_path, "agent-1", "Builder Agent");

    for value in ["10", "10", "10", "10", "10", "100"] {
        agentwatch(&db_path)
            .args(["record", "cost", "--agent", "agent-1", "--value", value])
            .assert()
            .success();
    }

    agentwatch(&db_path)
        .args(["cost", "analysis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total cost:       $150.0000"))
        .stdout(predicate::str::contains("Builder Agent"));

    agentwatch(&db_path)
        .args(["cost", "anomalies", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\": \"cost_spike\""));

    agentwatch(&db_path)
        .args(["cost", "recommend"])
        .assert()
        .success()
        .stdout(predicate::str::contains("model_switch"))
        .stdout(predicate::str::contains("anomaly_fix"));

    agentwatch(&db_path)
        .args(["cost", "breakdown", "--period", "day", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"breakdown\""));
}

#[test]
fn test_cost_analysis_empty() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["cost", "anomalies"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cost anomalies detected"));
}

#[test]
fn test_cost_analysis_rejects_zero_days() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["cost", "analysis", "--days", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("window must be at least 1 day"));
}

#[test]
fn test_predict_roi() {
    let (_temp, db_path) = setup_test_env();

    agentwatch(&db_path)
        .args(["cost", "predict-roi", "--tokens", "1000", "--complexity", "low"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recommended model: claude-3.5-haiku"));

    agentwatch(&db_path)
        .args(["cost", "predict-roi", "--complexity", "extreme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid complexity tier"));
}

#[test]
fn test_policy_file_overrides_defaults() {
    let (temp, db_path) = setup_test_env();
    let policy_path = temp.path().join("policy.toml");
    std::fs::write(
        &policy_path,
        "[roi.low]\ncandidates = [\"gpt-3.5-turbo\"]\nconfidence_bonus = 0.1\n",
    )
    .unwrap();

    agentwatch(&db_path)
        .arg("--policy")
        .arg(&policy_path)
        .args(["cost", "predict-roi", "--complexity", "low", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recommendedModel\": \"gpt-3.5-turbo\""));
}
