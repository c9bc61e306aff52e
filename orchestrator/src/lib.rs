//! Runs a repository's tests for one commit inside a Kubernetes sandbox pod.
//!
//! Every session gets its own namespace. A run applies (or locates) a sandbox
//! pod there, stages the commit, installs dependencies, executes the test
//! command, and always tears down what it created before returning a
//! [`TestResult`].

pub mod config;
pub mod deps;
pub mod error;
pub mod executor;
pub mod kubectl;
pub mod models;
pub mod namespace;
pub mod run;
pub mod sandbox;
pub mod shell;
pub mod source;
pub mod testexec;

pub use config::{load_config, validate_config, ConfigError, OrchestratorConfig, ProjectType};
pub use error::{RequestError, RunError};
pub use executor::{CommandExecutor, CommandOutput, ScriptedCommandExecutor, SystemCommandExecutor};
pub use kubectl::Kubectl;
pub use models::{
    validate_commit_ref, NamespaceReport, NamespaceState, ProvisionOutcome, RunPhase, SandboxMode,
    SessionIdentity, StepRecord, TestRequest, TestResult, TestStatus,
};
pub use namespace::NamespaceProvisioner;
pub use run::{RunPlan, TestRunner};
