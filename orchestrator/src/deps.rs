use tracing::{info, warn};

use crate::config::ProjectType;
use crate::error::RunError;
use crate::executor::CommandOutput;
use crate::kubectl::Kubectl;
use crate::models::SandboxHandle;
use crate::shell::shell_escape;

/// Runs a project type's dependency install inside the staged tree.
pub struct DependencyInstaller {
    source_dir: String,
}

impl DependencyInstaller {
    pub fn new(source_dir: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// Returns `None` when the project type has nothing to install.
    ///
    /// A non-zero exit is `DependencyInstallFailed` carrying the step's
    /// output. It is classified here rather than logged as a kubectl error,
    /// and never retried.
    pub fn install(
        &self,
        kubectl: &mut Kubectl,
        sandbox: &SandboxHandle,
        project: &ProjectType,
    ) -> Result<Option<CommandOutput>, RunError> {
        let Some(install) = project.install.as_deref().filter(|cmd| !cmd.trim().is_empty()) else {
            info!(pod = %sandbox.pod_name, "no install command configured");
            return Ok(None);
        };

        let script = format!("cd {} && (\n{}\n)", shell_escape(&self.source_dir), install);
        let output = kubectl.exec_in(&sandbox.pod_name, &script, false)?;
        if !output.success() {
            warn!(pod = %sandbox.pod_name, status = output.status, "dependency installation failed");
            return Err(RunError::DependencyInstallFailed {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(Some(output))
    }
}
