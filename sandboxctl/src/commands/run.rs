//! Run command - test commits in a sandbox pod and print JSON results

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use orchestrator::{
    validate_commit_ref, OrchestratorConfig, RunPlan, SandboxMode, SystemCommandExecutor,
    TestRunner,
};
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Namespace holding the sandbox
    #[arg(short = 'n', long)]
    pub namespace: String,

    /// Git repository URL
    #[arg(short = 'r', long = "repo-url")]
    pub repo_url: String,

    /// Commit to test; a comma-separated list runs them in order
    #[arg(short = 'c', long = "commit", value_delimiter = ',', required = true)]
    pub commits: Vec<String>,

    /// Test command (default: the project type's, `pytest tests/` for python)
    #[arg(short = 't', long = "test-cmd")]
    pub test_cmd: Option<String>,

    /// Project type from the config (default: the config's default project type)
    #[arg(long)]
    pub project_type: Option<String>,

    /// Use the long-lived sandbox pod instead of creating one
    #[arg(long)]
    pub reuse: bool,
}

/// Returns the process exit code. A batch exits 0 once every commit has
/// been run, whatever the individual outcomes.
pub fn run(args: RunArgs, config: OrchestratorConfig) -> Result<i32> {
    for commit in &args.commits {
        validate_commit_ref(commit).with_context(|| format!("Invalid commit '{}'", commit))?;
    }
    if args.repo_url.trim().is_empty() {
        anyhow::bail!("--repo-url cannot be empty");
    }

    let project_type = args
        .project_type
        .unwrap_or_else(|| config.default_project_type.clone());
    config.project(&project_type)?;

    let mode = if args.reuse {
        SandboxMode::Reuse
    } else {
        config.mode
    };

    let plan = RunPlan {
        namespace: args.namespace,
        repo_url: args.repo_url,
        commit: String::new(),
        project_type,
        test_command: args.test_cmd,
        mode,
    };
    let runner = TestRunner::new(Arc::new(SystemCommandExecutor), Arc::new(config));

    match args.commits.as_slice() {
        [commit] => {
            let result = runner.run(&plan.for_commit(commit));
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success { 0 } else { 1 })
        }
        commits => {
            info!(count = commits.len(), namespace = %plan.namespace, "running commit batch");
            let results = runner.run_batch(&plan, commits);
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(0)
        }
    }
}
