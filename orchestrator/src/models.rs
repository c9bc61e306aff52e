use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Prefix shared by every per-session namespace.
pub const NAMESPACE_PREFIX: &str = "im-";

// Hashes, branch and tag names, and `HEAD~2`-style revision suffixes.
static COMMIT_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/@^~+-]*$").unwrap());

/// Reject anything that is not a plain revision reference.
pub fn validate_commit_ref(commit: &str) -> Result<(), RequestError> {
    if commit.trim().is_empty() {
        return Err(RequestError::Missing { field: "commitHash" });
    }
    if !COMMIT_REF.is_match(commit) {
        return Err(RequestError::InvalidCommit {
            commit: commit.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub chat_id: String,
    pub user_id: String,
}

impl SessionIdentity {
    pub fn new(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Deterministic namespace for this session. The same identity always
    /// yields the same name.
    pub fn namespace_name(&self) -> String {
        format!("{}{}-{}", NAMESPACE_PREFIX, self.chat_id, self.user_id).to_lowercase()
    }
}

/// A request to test one commit, as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub user_id: String,
    pub chat_id: String,
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
}

impl TestRequest {
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity::new(&self.chat_id, &self.user_id)
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        for (field, value) in [
            ("userId", &self.user_id),
            ("chatId", &self.chat_id),
            ("repoURL", &self.repo_url),
        ] {
            if value.trim().is_empty() {
                return Err(RequestError::Missing { field });
            }
        }
        validate_commit_ref(&self.commit_hash)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Create the sandbox for this run and delete it afterwards.
    #[default]
    Ephemeral,
    /// Run inside a long-lived sandbox that outlives the run.
    Reuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyState {
    Provisioning,
    Ready,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub namespace: String,
    pub pod_name: String,
    pub ready_state: ReadyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceState {
    Existed,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub namespace: String,
    pub state: NamespaceState,
}

/// JSON report of the namespace provisioning tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NamespaceReport {
    pub fn from_outcome(outcome: &ProvisionOutcome) -> Self {
        let status = match outcome.state {
            NamespaceState::Existed => "exists",
            NamespaceState::Created => "created",
        };
        Self {
            status: status.to_string(),
            namespace: Some(outcome.namespace.clone()),
            timestamp: step_timestamp(),
            message: None,
        }
    }

    pub fn error(namespace: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            namespace,
            timestamp: step_timestamp(),
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    #[default]
    Unknown,
}

/// Phases of a run, in the order the orchestrator enters them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    ProvisioningSandbox,
    LocatingSandbox,
    AwaitingReadiness,
    CheckingExistingSource,
    UpdatingSource,
    CloningSource,
    CheckingOutCommit,
    InstallingDependencies,
    ExecutingTests,
    Finalizing,
}

impl RunPhase {
    pub fn step_id(&self) -> &'static str {
        match self {
            RunPhase::ProvisioningSandbox => "setup",
            RunPhase::LocatingSandbox => "locate",
            RunPhase::AwaitingReadiness => "readiness",
            RunPhase::CheckingExistingSource => "source_check",
            RunPhase::UpdatingSource => "source_update",
            RunPhase::CloningSource => "source_clone",
            RunPhase::CheckingOutCommit => "checkout",
            RunPhase::InstallingDependencies => "dependencies",
            RunPhase::ExecutingTests => "test_execution",
            RunPhase::Finalizing => "cleanup",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RunPhase::ProvisioningSandbox => "Deploying sandbox pod",
            RunPhase::LocatingSandbox => "Locating running sandbox pod",
            RunPhase::AwaitingReadiness => "Waiting for sandbox readiness",
            RunPhase::CheckingExistingSource => "Checking for existing source tree",
            RunPhase::UpdatingSource => "Updating existing repository",
            RunPhase::CloningSource => "Cloning repository",
            RunPhase::CheckingOutCommit => "Checking out commit",
            RunPhase::InstallingDependencies => "Installing dependencies",
            RunPhase::ExecutingTests => "Executing tests",
            RunPhase::Finalizing => "Cleaning up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub description: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubectlError {
    pub command: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub kubectl_errors: Vec<KubectlError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub namespace: String,
    pub mode: SandboxMode,
    pub status: TestStatus,
    pub success: bool,
    pub duration_seconds: f64,
    pub output: RunOutput,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl TestResult {
    pub fn new(commit: &str, namespace: &str, mode: SandboxMode) -> Self {
        Self {
            commit: commit.to_string(),
            commit_message: None,
            namespace: namespace.to_string(),
            mode,
            status: TestStatus::Unknown,
            success: false,
            duration_seconds: 0.0,
            output: RunOutput::default(),
            steps: Vec::new(),
        }
    }

    pub fn enter(&mut self, phase: RunPhase) {
        self.push_step(phase.step_id(), phase.description());
    }

    pub fn push_step(&mut self, step: &str, description: impl Into<String>) {
        self.steps.push(StepRecord {
            step: step.to_string(),
            description: description.into(),
            timestamp: step_timestamp(),
        });
    }

    /// Record captured output without clobbering anything already captured.
    pub fn capture(&mut self, stdout: &str, stderr: &str) {
        if self.output.stdout.is_empty() {
            self.output.stdout = stdout.to_string();
        }
        if self.output.stderr.is_empty() {
            self.output.stderr = stderr.to_string();
        }
    }

    pub fn set_status(&mut self, status: TestStatus) {
        self.status = status;
        self.success = status == TestStatus::Passed;
    }
}

pub(crate) fn step_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_name_is_lowercased_and_stable() {
        let identity = SessionIdentity::new("Chat42", "UserA");
        assert_eq!(identity.namespace_name(), "im-chat42-usera");
        assert_eq!(identity.namespace_name(), identity.clone().namespace_name());
    }

    #[test]
    fn request_parses_wire_field_names() {
        let request: TestRequest = serde_json::from_str(
            r#"{"userId":"u","chatId":"c","repoURL":"https://example.com/r.git","commitHash":"abc1234"}"#,
        )
        .unwrap();
        assert_eq!(request.repo_url, "https://example.com/r.git");
        assert_eq!(request.project_type, None);
        assert_eq!(request.identity().namespace_name(), "im-c-u");
    }

    #[test]
    fn validation_rejects_blank_fields_and_shell_syntax() {
        let request = TestRequest {
            user_id: "u".into(),
            chat_id: " ".into(),
            repo_url: "https://example.com/r.git".into(),
            commit_hash: "abc1234".into(),
            project_type: None,
        };
        assert_eq!(
            request.validate(),
            Err(RequestError::Missing { field: "chatId" })
        );

        assert!(validate_commit_ref("feature/login~2").is_ok());
        assert!(validate_commit_ref("v1.2.0").is_ok());
        assert!(validate_commit_ref("abc; rm -rf /").is_err());
        assert!(validate_commit_ref("$(whoami)").is_err());
        assert!(validate_commit_ref("-b").is_err());
    }

    #[test]
    fn capture_keeps_existing_output() {
        let mut result = TestResult::new("abc", "ns", SandboxMode::Ephemeral);
        result.capture("3 passed", "");
        result.capture("", "late failure");
        assert_eq!(result.output.stdout, "3 passed");
        assert_eq!(result.output.stderr, "late failure");
    }

    #[test]
    fn result_serializes_with_camel_case_output() {
        let mut result = TestResult::new("abc", "ns", SandboxMode::Reuse);
        result.set_status(TestStatus::Passed);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "passed");
        assert_eq!(json["success"], true);
        assert_eq!(json["mode"], "reuse");
        assert!(json["output"]["kubectlErrors"].as_array().unwrap().is_empty());
        assert!(json.get("commitMessage").is_none());
    }
}
