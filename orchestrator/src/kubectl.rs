use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RunError;
use crate::executor::{CommandExecutor, CommandOutput};
use crate::models::KubectlError;
use crate::shell::command_line_string;

/// kubectl bound to one executor and, optionally, one namespace.
///
/// Every mandatory command that exits non-zero is appended to an ordered
/// error log before the `CommandFailed` error is returned.
pub struct Kubectl {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
    namespace: Option<String>,
    errors: Vec<KubectlError>,
}

impl Kubectl {
    pub fn new(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
            namespace: None,
            errors: Vec::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Run `kubectl [-n <namespace>] <args>`.
    ///
    /// With `must_succeed` a non-zero exit becomes `CommandFailed`; without
    /// it the output is returned as-is, which is how existence checks work.
    pub fn execute(&mut self, args: &[&str], must_succeed: bool) -> Result<CommandOutput, RunError> {
        let mut full_args: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(namespace) = self.namespace.as_deref() {
            full_args.push("-n");
            full_args.push(namespace);
        }
        full_args.extend_from_slice(args);

        let command = command_line_string(&self.binary, &full_args);
        debug!(%command, "running kubectl");

        let output = self
            .executor
            .execute(&self.binary, &full_args)
            .map_err(|err| RunError::Transport {
                command: command.clone(),
                message: format!("{:#}", err),
            })?;

        if must_succeed && !output.success() {
            let stderr = output.stderr.trim().to_string();
            warn!(%command, status = output.status, error = %stderr, "kubectl command failed");
            self.errors.push(KubectlError {
                command: command.clone(),
                error: stderr.clone(),
            });
            return Err(RunError::CommandFailed {
                command,
                status: output.status,
                stdout: output.stdout,
                stderr,
            });
        }

        Ok(output)
    }

    /// Run a shell script inside a pod via `kubectl exec <pod> -- sh -c`.
    pub fn exec_in(
        &mut self,
        pod: &str,
        script: &str,
        must_succeed: bool,
    ) -> Result<CommandOutput, RunError> {
        self.execute(&["exec", pod, "--", "sh", "-c", script], must_succeed)
    }

    pub fn errors(&self) -> &[KubectlError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<KubectlError> {
        std::mem::take(&mut self.errors)
    }
}
