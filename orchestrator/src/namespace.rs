use std::sync::Arc;

use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::error::RunError;
use crate::executor::CommandExecutor;
use crate::kubectl::Kubectl;
use crate::models::{NamespaceState, ProvisionOutcome, SessionIdentity};

/// Creates or confirms the per-session namespace.
pub struct NamespaceProvisioner {
    executor: Arc<dyn CommandExecutor>,
    config: Arc<OrchestratorConfig>,
}

impl NamespaceProvisioner {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: Arc<OrchestratorConfig>) -> Self {
        Self { executor, config }
    }

    /// Make sure the identity's namespace exists. Safe to call repeatedly.
    ///
    /// When `project_type` is given, that project's sandbox template is
    /// applied into the namespace too, and a template failure fails the
    /// whole call.
    pub fn ensure(
        &self,
        identity: &SessionIdentity,
        project_type: Option<&str>,
    ) -> Result<ProvisionOutcome, RunError> {
        let namespace = identity.namespace_name();
        let mut kubectl = Kubectl::new(self.executor.clone(), &self.config.kubectl);

        let unavailable = |message: String| RunError::NamespaceUnavailable {
            namespace: namespace.clone(),
            message,
        };

        let check = kubectl
            .execute(&["get", "namespace", &namespace], false)
            .map_err(|err| unavailable(err.to_string()))?;

        let state = if check.success() {
            info!(%namespace, "namespace already exists");
            NamespaceState::Existed
        } else {
            let create = kubectl
                .execute(&["create", "namespace", &namespace], false)
                .map_err(|err| unavailable(err.to_string()))?;

            if create.success() {
                info!(%namespace, "namespace created");
                NamespaceState::Created
            } else if is_already_exists(&create.stderr) {
                info!(%namespace, "namespace created concurrently by another caller");
                NamespaceState::Existed
            } else {
                let stderr = create.stderr.trim();
                warn!(%namespace, error = %stderr, "namespace creation failed");
                let message = if stderr.is_empty() {
                    format!("kubectl create namespace exited with status {}", create.status)
                } else {
                    stderr.to_string()
                };
                return Err(unavailable(message));
            }
        };

        if let Some(project_type) = project_type {
            let template = self
                .config
                .template_for(project_type)
                .map_err(|err| unavailable(err.to_string()))?;
            let template = template.to_string_lossy().to_string();

            let mut scoped = Kubectl::new(self.executor.clone(), &self.config.kubectl)
                .in_namespace(&namespace);
            scoped
                .execute(&["apply", "-f", &template], true)
                .map_err(|err| match err {
                    RunError::CommandFailed { stderr, .. } => unavailable(format!(
                        "applying sandbox template {} failed: {}",
                        template, stderr
                    )),
                    other => unavailable(other.to_string()),
                })?;
            info!(%namespace, %project_type, "sandbox template applied");
        }

        Ok(ProvisionOutcome { namespace, state })
    }
}

fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("AlreadyExists") || stderr.contains("already exists")
}
