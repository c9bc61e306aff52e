use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use gateway::OrchestratorService;
use orchestrator::{OrchestratorConfig, SystemCommandExecutor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = OrchestratorConfig::from_env().context("Failed to load orchestrator configuration")?;
    info!(mode = ?config.mode, kubectl = %config.kubectl, "orchestrator configured");

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .with_context(|| format!("Invalid PORT '{}'", port))?;

    let handler = Arc::new(OrchestratorService::new(
        Arc::new(SystemCommandExecutor),
        Arc::new(config),
    ));
    gateway::serve(addr, handler).await
}
