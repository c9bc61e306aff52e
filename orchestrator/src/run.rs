use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::config::{OrchestratorConfig, ProjectType};
use crate::deps::DependencyInstaller;
use crate::error::RunError;
use crate::executor::CommandExecutor;
use crate::kubectl::Kubectl;
use crate::models::{RunPhase, SandboxHandle, SandboxMode, TestResult, TestStatus};
use crate::sandbox::SandboxManager;
use crate::source::SourceStager;
use crate::testexec::{TestEngine, TestOutcome};

/// Everything needed to test one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub namespace: String,
    pub repo_url: String,
    pub commit: String,
    pub project_type: String,
    /// Overrides the project type's test command.
    pub test_command: Option<String>,
    pub mode: SandboxMode,
}

impl RunPlan {
    pub fn for_commit(&self, commit: &str) -> Self {
        Self {
            commit: commit.to_string(),
            ..self.clone()
        }
    }
}

/// Sequences one test run per commit and always produces a terminal result.
pub struct TestRunner {
    executor: Arc<dyn CommandExecutor>,
    config: Arc<OrchestratorConfig>,
}

impl TestRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: Arc<OrchestratorConfig>) -> Self {
        Self { executor, config }
    }

    /// Run every commit in order, one after another, with the same plan.
    pub fn run_batch(&self, plan: &RunPlan, commits: &[String]) -> Vec<TestResult> {
        commits
            .iter()
            .map(|commit| self.run(&plan.for_commit(commit)))
            .collect()
    }

    /// Test a single commit. Never fails: every failure becomes the
    /// returned result's status.
    pub fn run(&self, plan: &RunPlan) -> TestResult {
        let started = Instant::now();
        let mut result = TestResult::new(&plan.commit, &plan.namespace, plan.mode);
        let mut kubectl =
            Kubectl::new(self.executor.clone(), &self.config.kubectl).in_namespace(&plan.namespace);

        info!(
            namespace = %plan.namespace,
            commit = %plan.commit,
            mode = ?plan.mode,
            project_type = %plan.project_type,
            "starting test run"
        );

        let prepared = self.config.project(&plan.project_type).and_then(|project| {
            let template = self.config.template_for(&plan.project_type)?;
            Ok((project, template))
        });

        let mut sandbox = match prepared {
            Ok((project, template)) => {
                let manager = SandboxManager::new(
                    plan.mode,
                    template,
                    &self.config.pod_selector,
                    self.config.ready_timeout(plan.mode),
                );
                let mut handle = manager.handle(&plan.namespace);

                match self.execute(&mut kubectl, &manager, &mut handle, project, plan, &mut result) {
                    Ok(outcome) => {
                        result.capture(&outcome.stdout, &outcome.stderr);
                        result.set_status(outcome.status());
                    }
                    Err(err) => record_failure(&mut result, &err),
                }
                Some((manager, handle))
            }
            Err(err) => {
                let message = err.to_string();
                warn!(namespace = %plan.namespace, error = %message, "run cannot start");
                result.push_step("failed", message.as_str());
                result.capture("", &message);
                result.set_status(TestStatus::Error);
                None
            }
        };

        self.finalize(&mut kubectl, sandbox.as_mut(), &mut result, started);
        result
    }

    fn execute(
        &self,
        kubectl: &mut Kubectl,
        manager: &SandboxManager,
        handle: &mut SandboxHandle,
        project: &ProjectType,
        plan: &RunPlan,
        result: &mut TestResult,
    ) -> Result<TestOutcome, RunError> {
        result.enter(match manager.mode() {
            SandboxMode::Ephemeral => RunPhase::ProvisioningSandbox,
            SandboxMode::Reuse => RunPhase::LocatingSandbox,
        });
        manager.provision(kubectl, handle)?;

        result.enter(RunPhase::AwaitingReadiness);
        manager.await_ready(kubectl, handle)?;

        let stager = SourceStager::new(&self.config.source_dir);
        let commit_message = stager.stage(
            kubectl,
            handle,
            &plan.repo_url,
            &plan.commit,
            &mut |phase| result.enter(phase),
        )?;
        result.commit_message = commit_message;

        result.enter(RunPhase::InstallingDependencies);
        let installer = DependencyInstaller::new(&self.config.source_dir);
        if installer.install(kubectl, handle, project)?.is_none() {
            result.push_step("dependencies_skipped", "No install command configured");
        }

        result.enter(RunPhase::ExecutingTests);
        let test_command = plan.test_command.as_deref().unwrap_or(&project.test);
        TestEngine::new(&self.config.source_dir).run(kubectl, handle, test_command)
    }

    fn finalize(
        &self,
        kubectl: &mut Kubectl,
        sandbox: Option<&mut (SandboxManager, SandboxHandle)>,
        result: &mut TestResult,
        started: Instant,
    ) {
        result.enter(RunPhase::Finalizing);

        if let Some((manager, handle)) = sandbox {
            if let Err(err) = manager.teardown(kubectl, handle) {
                warn!(namespace = %handle.namespace, error = %err, "cleanup failed");
                result.push_step("cleanup_failed", err.to_string());
            }
        }

        result.output.kubectl_errors = kubectl.take_errors();
        result.duration_seconds = round_seconds(started.elapsed().as_secs_f64());

        if result.status == TestStatus::Unknown {
            error!(commit = %result.commit, "run finished without a status");
            result.capture("", "run finished without a status");
            result.set_status(TestStatus::Error);
        }

        info!(
            namespace = %result.namespace,
            commit = %result.commit,
            status = ?result.status,
            duration_seconds = result.duration_seconds,
            "test run finished"
        );
    }
}

fn record_failure(result: &mut TestResult, err: &RunError) {
    let message = err.to_string();
    warn!(commit = %result.commit, error = %message, "test run failed");

    if let Some((stdout, stderr)) = err.captured_output() {
        result.capture(stdout, stderr);
    }
    result.push_step("failed", message.as_str());
    result.capture("", &message);
    result.set_status(err.status());
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedCommandExecutor;

    fn plan(mode: SandboxMode) -> RunPlan {
        RunPlan {
            namespace: "im-c-u".to_string(),
            repo_url: "https://github.com/acme/app".to_string(),
            commit: "abc1234".to_string(),
            project_type: "python".to_string(),
            test_command: None,
            mode,
        }
    }

    fn runner(executor: Arc<ScriptedCommandExecutor>) -> TestRunner {
        TestRunner::new(executor, Arc::new(OrchestratorConfig::default()))
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_seconds(1.23456), 1.23);
        assert_eq!(round_seconds(2.499), 2.5);
    }

    #[test]
    fn unknown_project_type_is_error_without_touching_cluster() {
        let executor = Arc::new(ScriptedCommandExecutor::new());
        let mut plan = plan(SandboxMode::Ephemeral);
        plan.project_type = "cobol".to_string();

        let result = runner(executor.clone()).run(&plan);

        assert_eq!(result.status, TestStatus::Error);
        assert!(result.output.stderr.contains("cobol"));
        assert!(executor.calls().is_empty());
        assert_eq!(result.steps.last().unwrap().step, "cleanup");
    }

    #[test]
    fn test_command_override_replaces_project_default() {
        let executor = Arc::new(
            ScriptedCommandExecutor::new()
                .on_success("jsonpath", "pod-1")
                .on_failure("test -d", ""),
        );
        let mut plan = plan(SandboxMode::Ephemeral);
        plan.test_command = Some("pytest -k smoke".to_string());

        let result = runner(executor.clone()).run(&plan);

        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(executor.count_matching("pytest -k smoke"), 1);
        assert_eq!(executor.count_matching("pytest tests/"), 0);
    }

    #[test]
    fn missing_install_command_is_recorded() {
        let executor = Arc::new(
            ScriptedCommandExecutor::new()
                .on_success("jsonpath", "pod-1")
                .on_failure("test -d", ""),
        );
        let mut config = OrchestratorConfig::default();
        if let Some(python) = config.project_types.get_mut("python") {
            python.install = None;
        }
        let runner = TestRunner::new(executor, Arc::new(config));

        let result = runner.run(&plan(SandboxMode::Ephemeral));

        assert!(result.steps.iter().any(|s| s.step == "dependencies_skipped"));
        assert_eq!(result.status, TestStatus::Passed);
    }
}
