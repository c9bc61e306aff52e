//! Namespace command - create or confirm a session's namespace

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use orchestrator::{
    NamespaceProvisioner, NamespaceReport, OrchestratorConfig, RunError, SessionIdentity,
    SystemCommandExecutor,
};
use tracing::error;

#[derive(Args, Debug)]
pub struct NamespaceArgs {
    /// Chat identifier
    #[arg(long)]
    pub chat_id: String,

    /// User identifier
    #[arg(long)]
    pub user_id: String,

    /// Also apply this project type's sandbox template
    #[arg(long)]
    pub project_type: Option<String>,
}

pub fn run(args: NamespaceArgs, config: OrchestratorConfig) -> Result<i32> {
    let report = if args.chat_id.trim().is_empty() || args.user_id.trim().is_empty() {
        NamespaceReport::error(None, "chat id and user id are required")
    } else {
        let identity = SessionIdentity::new(args.chat_id, args.user_id);
        let provisioner = NamespaceProvisioner::new(Arc::new(SystemCommandExecutor), Arc::new(config));

        match provisioner.ensure(&identity, args.project_type.as_deref()) {
            Ok(outcome) => NamespaceReport::from_outcome(&outcome),
            Err(err) => {
                error!(namespace = %identity.namespace_name(), error = %err, "namespace provisioning failed");
                let message = match err {
                    RunError::NamespaceUnavailable { message, .. } => message,
                    other => other.to_string(),
                };
                NamespaceReport::error(Some(identity.namespace_name()), message)
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.is_error() { 1 } else { 0 })
}
