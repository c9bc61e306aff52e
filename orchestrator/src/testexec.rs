use std::time::Instant;

use tracing::info;

use crate::error::RunError;
use crate::kubectl::Kubectl;
use crate::models::{SandboxHandle, TestStatus};
use crate::shell::shell_escape;

#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_seconds: f64,
}

impl TestOutcome {
    pub fn status(&self) -> TestStatus {
        if self.exit_code == 0 {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        }
    }
}

/// Runs the test command inside the sandbox.
pub struct TestEngine {
    source_dir: String,
}

impl TestEngine {
    pub fn new(source_dir: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// A failing test command is a normal `Ok` outcome; only a transport
    /// failure (the command could not be run at all) is an error.
    pub fn run(
        &self,
        kubectl: &mut Kubectl,
        sandbox: &SandboxHandle,
        test_command: &str,
    ) -> Result<TestOutcome, RunError> {
        // The subshell keeps `&&`, `||` and `;` in the test command grouped.
        let script = format!(
            "cd {} && (\n{}\n)",
            shell_escape(&self.source_dir),
            test_command
        );

        let started = Instant::now();
        let output = kubectl
            .exec_in(&sandbox.pod_name, &script, false)
            .map_err(|err| RunError::TestExecutionError {
                message: err.to_string(),
            })?;
        let duration_seconds = started.elapsed().as_secs_f64();

        info!(
            pod = %sandbox.pod_name,
            exit_code = output.status,
            duration_seconds,
            "test command finished"
        );

        Ok(TestOutcome {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status,
            duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedCommandExecutor;
    use crate::models::ReadyState;
    use std::sync::Arc;

    fn sandbox() -> SandboxHandle {
        SandboxHandle {
            namespace: "ns".to_string(),
            pod_name: "pod-1".to_string(),
            ready_state: ReadyState::Ready,
        }
    }

    #[test]
    fn exit_code_decides_status() {
        let executor = Arc::new(
            ScriptedCommandExecutor::new()
                .on("pytest tests/", 0, "3 passed", "")
                .on("npm test", 1, "", "1 failing"),
        );
        let mut kubectl = Kubectl::new(executor, "kubectl").in_namespace("ns");
        let engine = TestEngine::new("/app/repo");

        let passed = engine.run(&mut kubectl, &sandbox(), "pytest tests/").unwrap();
        let failed = engine.run(&mut kubectl, &sandbox(), "npm test").unwrap();

        assert_eq!(passed.status(), TestStatus::Passed);
        assert_eq!(passed.stdout, "3 passed");
        assert_eq!(failed.status(), TestStatus::Failed);
        assert!(kubectl.errors().is_empty());
    }

    #[test]
    fn compound_commands_are_wrapped_in_a_subshell() {
        let executor = Arc::new(ScriptedCommandExecutor::new());
        let mut kubectl = Kubectl::new(executor.clone(), "kubectl").in_namespace("ns");

        TestEngine::new("/app/repo")
            .run(&mut kubectl, &sandbox(), "make lint && make test")
            .unwrap();

        assert_eq!(
            executor.count_matching("cd '/app/repo' && (\nmake lint && make test\n)"),
            1
        );
    }

    #[test]
    fn transport_failure_is_test_execution_error() {
        let executor = Arc::new(ScriptedCommandExecutor::new().on_transport_error("exec", "broken pipe"));
        let mut kubectl = Kubectl::new(executor, "kubectl").in_namespace("ns");

        let err = TestEngine::new("/app/repo")
            .run(&mut kubectl, &sandbox(), "pytest")
            .unwrap_err();

        assert!(matches!(err, RunError::TestExecutionError { .. }));
        assert_eq!(err.status(), TestStatus::Error);
    }
}
