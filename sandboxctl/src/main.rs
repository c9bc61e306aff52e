use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::OrchestratorConfig;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "sandboxctl", version, about = "Run commit tests in Kubernetes sandboxes")]
struct Cli {
    /// Path to orchestrator config YAML (built-in defaults when unset)
    #[arg(long, global = true, env = "SANDBOX_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test one commit, or a comma-separated batch, in a sandbox pod
    Run(commands::run::RunArgs),
    /// Create or confirm the namespace for a chat session
    Namespace(commands::namespace::NamespaceArgs),
    /// Print version and exit
    Version,
}

fn init_tracing() {
    // stdout carries the JSON report
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let load_config = || {
        OrchestratorConfig::load_or_default(cli.config.as_deref())
            .context("Failed to load orchestrator configuration")
    };

    let code = match cli.cmd {
        Commands::Run(args) => commands::run::run(args, load_config()?)?,
        Commands::Namespace(args) => commands::namespace::run(args, load_config()?)?,
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
