use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::RunError;
use crate::kubectl::Kubectl;
use crate::models::{ReadyState, SandboxHandle, SandboxMode};

/// Acquires, readies, and releases the sandbox pod for a run.
///
/// Ephemeral sandboxes are created from the template and deleted again on
/// teardown. Reused sandboxes are located by label and left running.
pub struct SandboxManager {
    mode: SandboxMode,
    template: PathBuf,
    selector: String,
    ready_timeout: Duration,
}

impl SandboxManager {
    pub fn new(
        mode: SandboxMode,
        template: PathBuf,
        selector: impl Into<String>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            mode,
            template,
            selector: selector.into(),
            ready_timeout,
        }
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    pub fn handle(&self, namespace: &str) -> SandboxHandle {
        SandboxHandle {
            namespace: namespace.to_string(),
            pod_name: String::new(),
            ready_state: ReadyState::Provisioning,
        }
    }

    /// Ephemeral: apply the template. Reuse: find the running pod.
    pub fn provision(&self, kubectl: &mut Kubectl, handle: &mut SandboxHandle) -> Result<(), RunError> {
        match self.mode {
            SandboxMode::Ephemeral => {
                let template = self.template_arg();
                info!(namespace = %handle.namespace, %template, "deploying sandbox");
                kubectl.execute(&["apply", "-f", &template], true)?;
            }
            SandboxMode::Reuse => {
                let pod_name = self.resolve_pod_name(kubectl, &handle.namespace)?;
                if pod_name.is_empty() {
                    return Err(self.not_ready(
                        &handle.namespace,
                        format!("no sandbox pod matches selector {}", self.selector),
                    ));
                }
                info!(namespace = %handle.namespace, pod = %pod_name, "reusing sandbox");
                handle.pod_name = pod_name;
            }
        }
        Ok(())
    }

    /// Block until the sandbox reports Ready or the timeout elapses.
    pub fn await_ready(&self, kubectl: &mut Kubectl, handle: &mut SandboxHandle) -> Result<(), RunError> {
        let namespace = handle.namespace.clone();
        let timeout = format!("--timeout={}s", self.ready_timeout.as_secs());
        let target = if handle.pod_name.is_empty() {
            None
        } else {
            Some(format!("pod/{}", handle.pod_name))
        };

        let mut args = vec!["wait", "--for=condition=Ready"];
        match target.as_deref() {
            Some(pod) => args.push(pod),
            None => args.extend_from_slice(&["pod", "-l", self.selector.as_str()]),
        }
        args.push(&timeout);

        kubectl.execute(&args, true).map_err(|err| match err {
            RunError::CommandFailed { stderr, .. } => self.not_ready(&namespace, stderr),
            other => other,
        })?;

        if handle.pod_name.is_empty() {
            let pod_name = self.resolve_pod_name(kubectl, &namespace)?;
            if pod_name.is_empty() {
                return Err(self.not_ready(
                    &namespace,
                    "sandbox pod name could not be resolved".to_string(),
                ));
            }
            handle.pod_name = pod_name;
        }

        handle.ready_state = ReadyState::Ready;
        info!(namespace = %handle.namespace, pod = %handle.pod_name, "sandbox ready");
        Ok(())
    }

    /// Delete an ephemeral sandbox. Reused sandboxes are left alone.
    ///
    /// Runs even when provisioning never completed, since a partial apply
    /// can still leave resources behind.
    pub fn teardown(&self, kubectl: &mut Kubectl, handle: &mut SandboxHandle) -> Result<(), RunError> {
        if self.mode == SandboxMode::Reuse {
            return Ok(());
        }

        let template = self.template_arg();
        let output = kubectl
            .execute(&["delete", "-f", &template, "--ignore-not-found=true"], false)
            .map_err(|err| RunError::CleanupFailed {
                message: err.to_string(),
            })?;

        if !output.success() {
            warn!(namespace = %handle.namespace, error = %output.stderr.trim(), "sandbox teardown failed");
            return Err(RunError::CleanupFailed {
                message: output.stderr.trim().to_string(),
            });
        }

        handle.ready_state = ReadyState::Terminated;
        info!(namespace = %handle.namespace, "sandbox deleted");
        Ok(())
    }

    /// First live pod matching the selector, or an empty string when none
    /// does. A failed lookup means the sandbox is not there to use.
    fn resolve_pod_name(&self, kubectl: &mut Kubectl, namespace: &str) -> Result<String, RunError> {
        let output = kubectl
            .execute(
                &[
                    "get",
                    "pod",
                    "-l",
                    &self.selector,
                    "--field-selector=status.phase!=Succeeded,status.phase!=Failed",
                    "-o",
                    "jsonpath={.items[*].metadata.name}",
                ],
                true,
            )
            .map_err(|err| match err {
                RunError::CommandFailed { stderr, .. } => self.not_ready(namespace, stderr),
                other => other,
            })?;
        Ok(output
            .stdout
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    fn template_arg(&self) -> String {
        self.template.to_string_lossy().to_string()
    }

    fn not_ready(&self, namespace: &str, message: String) -> RunError {
        RunError::SandboxNotReady {
            namespace: namespace.to_string(),
            timeout_secs: self.ready_timeout.as_secs(),
            message: message.trim().to_string(),
        }
    }
}
