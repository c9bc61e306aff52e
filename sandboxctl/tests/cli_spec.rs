use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

fn sandboxctl(kubectl: &str) -> Command {
    let mut cmd = Command::cargo_bin("sandboxctl").unwrap();
    cmd.env_remove("SANDBOX_CONFIG").env("KUBECTL_BIN", kubectl);
    cmd
}

#[test]
fn given_help_flag_when_run_then_shows_usage() {
    sandboxctl("kubectl")
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--repo-url"))
        .stdout(predicate::str::contains("--reuse"));
}

#[test]
fn given_no_commit_when_run_then_shows_error() {
    sandboxctl("kubectl")
        .args(["run", "-n", "im-c-u", "-r", "https://example.com/r.git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--commit <COMMITS>"));
}

#[test]
fn given_shell_syntax_in_commit_when_run_then_rejects_before_kubectl() {
    sandboxctl("/nonexistent/kubectl")
        .args(["run", "-n", "im-c-u", "-r", "https://example.com/r.git", "-c", "main;reboot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid commit 'main;reboot'"));
}

#[test]
fn given_unknown_project_type_when_run_then_shows_error() {
    sandboxctl("kubectl")
        .args([
            "run",
            "-n",
            "im-c-u",
            "-r",
            "https://example.com/r.git",
            "-c",
            "abc1234",
            "--project-type",
            "cobol",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown project type 'cobol'"));
}

#[test]
fn given_invalid_yaml_config_when_run_then_shows_parse_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "projectTypes: [unclosed").unwrap();

    sandboxctl("kubectl")
        .arg("--config")
        .arg(file.path())
        .args(["namespace", "--chat-id", "c", "--user-id", "u"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[cfg(unix)]
#[test]
fn given_cooperative_cluster_when_run_single_commit_then_prints_passed_result() -> Result<()> {
    let output = sandboxctl("echo")
        .args(["run", "-n", "im-c-u", "-r", "https://example.com/r.git", "-c", "abc1234"])
        .output()?;

    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(result["commit"], "abc1234");
    assert_eq!(result["status"], "passed");
    assert_eq!(result["success"], true);
    assert_eq!(result["mode"], "ephemeral");
    Ok(())
}

#[cfg(unix)]
#[test]
fn given_failing_cluster_when_run_single_commit_then_exits_nonzero_with_result() -> Result<()> {
    let output = sandboxctl("false")
        .args(["run", "-n", "im-c-u", "-r", "https://example.com/r.git", "-c", "abc1234"])
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let result: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(result["status"], "failed");
    assert_eq!(result["output"]["kubectlErrors"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[cfg(unix)]
#[test]
fn given_batch_when_run_then_prints_results_in_order_and_exits_zero() -> Result<()> {
    let output = sandboxctl("false")
        .args(["run", "-n", "im-c-u", "-r", "https://example.com/r.git", "-c", "c1,c2,c3"])
        .output()?;

    assert!(output.status.success());
    let results: Value = serde_json::from_slice(&output.stdout)?;
    let commits: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["commit"].as_str().unwrap())
        .collect();
    assert_eq!(commits, vec!["c1", "c2", "c3"]);
    Ok(())
}

#[cfg(unix)]
#[test]
fn given_existing_namespace_when_provisioning_then_reports_exists() -> Result<()> {
    let output = sandboxctl("echo")
        .args(["namespace", "--chat-id", "Chat9", "--user-id", "bob"])
        .output()?;

    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["status"], "exists");
    assert_eq!(report["namespace"], "im-chat9-bob");
    Ok(())
}

#[cfg(unix)]
#[test]
fn given_unreachable_cluster_when_provisioning_then_reports_error() -> Result<()> {
    let output = sandboxctl("false")
        .args(["namespace", "--chat-id", "c", "--user-id", "u"])
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["status"], "error");
    assert_eq!(report["namespace"], "im-c-u");
    assert!(report["message"].as_str().unwrap().contains("exited with status 1"));
    Ok(())
}
