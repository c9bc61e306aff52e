use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orchestrator::{
    CommandExecutor, NamespaceProvisioner, NamespaceReport, OrchestratorConfig, RunPlan,
    SandboxMode, TestRequest, TestRunner,
};
use tracing::{error, info, warn};

use crate::protocol::ServerMessage;

/// Turns one test request into exactly one reply.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: TestRequest) -> ServerMessage;
}

/// One async lock per namespace so two connections for the same session
/// never share a sandbox at the same time.
#[derive(Default)]
pub struct NamespaceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NamespaceLocks {
    pub fn lock_for(&self, namespace: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forget the namespace's lock once nobody else holds or waits on it.
    pub fn release(&self, namespace: &str) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(namespace)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(namespace);
        }
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Provisions the session namespace, then runs the orchestrator for the
/// requested commit on the blocking pool.
pub struct OrchestratorService {
    executor: Arc<dyn CommandExecutor>,
    config: Arc<OrchestratorConfig>,
    locks: NamespaceLocks,
}

impl OrchestratorService {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: Arc<OrchestratorConfig>) -> Self {
        Self {
            executor,
            config,
            locks: NamespaceLocks::default(),
        }
    }

    async fn run_locked(&self, request: TestRequest, project_type: String) -> ServerMessage {
        let identity = request.identity();
        let namespace = identity.namespace_name();

        info!(%namespace, commit = %request.commit_hash, %project_type, "handling test request");

        let executor = self.executor.clone();
        let config = self.config.clone();
        let joined = tokio::task::spawn_blocking(move || {
            // Reused sandboxes are long-lived, so provisioning makes sure the
            // pod exists. Ephemeral runs apply their own template.
            let template = match config.mode {
                SandboxMode::Reuse => Some(project_type.as_str()),
                SandboxMode::Ephemeral => None,
            };

            let provisioner = NamespaceProvisioner::new(executor.clone(), config.clone());
            let outcome = match provisioner.ensure(&identity, template) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(namespace = %identity.namespace_name(), error = %err, "namespace unavailable");
                    return ServerMessage::error(format!("Namespace error: {}", err));
                }
            };

            let plan = RunPlan {
                namespace: outcome.namespace.clone(),
                repo_url: request.repo_url,
                commit: request.commit_hash,
                project_type,
                test_command: None,
                mode: config.mode,
            };
            let result = TestRunner::new(executor, config).run(&plan);
            ServerMessage::test_results(NamespaceReport::from_outcome(&outcome), result)
        })
        .await;

        match joined {
            Ok(message) => message,
            Err(err) => {
                error!(%namespace, error = %err, "test run task failed");
                ServerMessage::error(format!("Test execution failed: {}", err))
            }
        }
    }
}

#[async_trait]
impl RequestHandler for OrchestratorService {
    async fn handle(&self, request: TestRequest) -> ServerMessage {
        if let Err(err) = request.validate() {
            warn!(error = %err, "rejecting invalid test request");
            return ServerMessage::error(format!("Invalid request: {}", err));
        }

        let project_type = request
            .project_type
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.config.default_project_type.clone());
        if let Err(err) = self.config.project(&project_type) {
            return ServerMessage::error(format!("Invalid request: {}", err));
        }

        let namespace = request.identity().namespace_name();
        let lock = self.locks.lock_for(&namespace);
        let reply = {
            let _guard = lock.lock().await;
            self.run_locked(request, project_type).await
        };
        drop(lock);
        self.locks.release(&namespace);
        reply
    }
}
