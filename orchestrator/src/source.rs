use tracing::{info, warn};

use crate::error::RunError;
use crate::kubectl::Kubectl;
use crate::models::{RunPhase, SandboxHandle};
use crate::shell::shell_escape;

/// Puts the requested commit's source tree into the sandbox.
pub struct SourceStager {
    source_dir: String,
}

impl SourceStager {
    pub fn new(source_dir: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }

    /// Stage `commit` of `repo_url` and return its one-line summary.
    ///
    /// An existing tree (reuse mode) whose origin is `repo_url` is fetched and
    /// hard-reset to the remote default branch instead of being cloned again.
    /// A tree checked out from any other repository is replaced. `on_phase`
    /// is told about each phase as it is entered.
    pub fn stage(
        &self,
        kubectl: &mut Kubectl,
        sandbox: &SandboxHandle,
        repo_url: &str,
        commit: &str,
        on_phase: &mut dyn FnMut(RunPhase),
    ) -> Result<Option<String>, RunError> {
        on_phase(RunPhase::CheckingExistingSource);
        let reusable = self.has_existing_tree(kubectl, sandbox)?
            && self.origin_matches(kubectl, sandbox, repo_url)?;
        if reusable {
            on_phase(RunPhase::UpdatingSource);
            self.update(kubectl, sandbox)?;
        } else {
            on_phase(RunPhase::CloningSource);
            self.clone_fresh(kubectl, sandbox, repo_url)?;
        }

        on_phase(RunPhase::CheckingOutCommit);
        self.checkout(kubectl, sandbox, commit)
    }

    pub fn has_existing_tree(&self, kubectl: &mut Kubectl, sandbox: &SandboxHandle) -> Result<bool, RunError> {
        let script = format!("test -d {}", shell_escape(&format!("{}/.git", self.source_dir)));
        let output = kubectl.exec_in(&sandbox.pod_name, &script, false)?;
        Ok(output.success())
    }

    /// Whether the existing tree was cloned from `repo_url`.
    pub fn origin_matches(
        &self,
        kubectl: &mut Kubectl,
        sandbox: &SandboxHandle,
        repo_url: &str,
    ) -> Result<bool, RunError> {
        let script = format!("cd {} && git remote get-url origin", shell_escape(&self.source_dir));
        let output = kubectl.exec_in(&sandbox.pod_name, &script, false)?;
        let origin = output.stdout.trim();
        if output.success() && origin == repo_url {
            return Ok(true);
        }
        info!(pod = %sandbox.pod_name, %origin, %repo_url, "existing tree belongs to another repository");
        Ok(false)
    }

    pub fn update(&self, kubectl: &mut Kubectl, sandbox: &SandboxHandle) -> Result<(), RunError> {
        info!(pod = %sandbox.pod_name, dir = %self.source_dir, "updating existing source tree");
        let script = format!(
            "cd {} && git fetch --quiet origin && git reset --quiet --hard origin/HEAD",
            shell_escape(&self.source_dir)
        );
        kubectl.exec_in(&sandbox.pod_name, &script, true)?;
        Ok(())
    }

    pub fn clone_fresh(
        &self,
        kubectl: &mut Kubectl,
        sandbox: &SandboxHandle,
        repo_url: &str,
    ) -> Result<(), RunError> {
        info!(pod = %sandbox.pod_name, %repo_url, "cloning repository");
        let dir = shell_escape(&self.source_dir);
        let script = format!(
            "rm -rf {dir} && git clone --quiet {} {dir}",
            shell_escape(repo_url)
        );
        kubectl.exec_in(&sandbox.pod_name, &script, true)?;
        Ok(())
    }

    /// Check out `commit`. A reference that cannot be resolved is
    /// `CheckoutFailed`; it is never retried.
    pub fn checkout(
        &self,
        kubectl: &mut Kubectl,
        sandbox: &SandboxHandle,
        commit: &str,
    ) -> Result<Option<String>, RunError> {
        let dir = shell_escape(&self.source_dir);
        let script = format!("cd {} && git checkout --quiet {}", dir, shell_escape(commit));
        let output = kubectl.exec_in(&sandbox.pod_name, &script, false)?;
        if !output.success() {
            return Err(RunError::CheckoutFailed {
                commit: commit.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        let summary = format!("cd {} && git log -1 --format=%s", dir);
        let output = kubectl.exec_in(&sandbox.pod_name, &summary, false)?;
        let message = output.stdout.trim();
        if !output.success() || message.is_empty() {
            warn!(%commit, error = %output.stderr.trim(), "could not read commit summary");
            return Ok(None);
        }
        Ok(Some(message.to_string()))
    }
}
