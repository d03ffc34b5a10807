// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conductor main entry point - CLI and the stdio session server.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio::io::BufReader;

use conductor::config::{self, CliOptions, ReasonerKind};
use conductor::runtime::Runtime;
use conductor::telemetry::{init_telemetry, TelemetryConfig};

/// Conductor version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Conductor - supervisor-driven orchestration of agent workers.
#[derive(Parser)]
#[command(name = "conductor")]
#[command(author, version, about = "Supervisor-driven orchestration of agent workers", long_about = None)]
struct Cli {
    /// Directory to load configuration from (defaults to the nearest config root)
    #[arg(short, long, env = "CONDUCTOR_WORKSPACE", global = true)]
    workspace: Option<PathBuf>,

    /// Command used to start workers without an explicit entry
    #[arg(long, env = "CONDUCTOR_WORKER_COMMAND", global = true)]
    worker_command: Option<String>,

    /// Reasoner that proposes the next agent
    #[arg(long, value_enum, global = true)]
    reasoner: Option<Reasoner>,

    /// Maximum supervisor iterations per workflow
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Errors tolerated before a workflow is finished
    #[arg(long, global = true)]
    error_limit: Option<usize>,

    /// Minimum confidence before escalating to a human
    #[arg(long, global = true)]
    confidence_threshold: Option<f64>,

    /// Restarts allowed per worker
    #[arg(long, global = true)]
    max_restarts: Option<u32>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available reasoners.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Reasoner {
    /// Built-in fixed plan
    Plan,
    /// Out-of-process supervisor worker
    Worker,
}

impl From<Reasoner> for ReasonerKind {
    fn from(reasoner: Reasoner) -> Self {
        match reasoner {
            Reasoner::Plan => ReasonerKind::Plan,
            Reasoner::Worker => ReasonerKind::Worker,
        }
    }
}

/// Subcommands for conductor.
#[derive(Subcommand)]
enum Commands {
    /// Serve one session over stdin/stdout (default)
    Serve,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init {
        /// Write an annotated example instead of an empty config
        #[arg(long)]
        example: bool,
    },

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Stdout carries protocol frames; logs go to stderr.
    let _guard = init_telemetry(&TelemetryConfig::from_verbosity(cli.verbose))?;

    let workspace_root = match &cli.workspace {
        Some(path) => path.clone(),
        None => {
            let cwd = std::env::current_dir()?;
            config::find_workspace_root(&cwd).unwrap_or(cwd)
        }
    };

    let cli_options = CliOptions {
        max_iterations: cli.max_iterations,
        error_limit: cli.error_limit,
        confidence_threshold: cli.confidence_threshold,
        per_agent_cap: None,
        worker_command: cli.worker_command,
        max_restarts: cli.max_restarts,
        reasoner: cli.reasoner.map(ReasonerKind::from),
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&workspace_root, cli_options).await,
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                let config = config::load_config(&workspace_root, cli_options)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        },
        Commands::Init { example } => {
            let initial = example.then(config::get_example_config);
            let path = config::init_config(&workspace_root, initial)?;
            println!("{} {}", "Created config file:".green(), path.display());
            Ok(())
        }
        Commands::Version => {
            println!("conductor {}", VERSION);
            Ok(())
        }
    }
}

async fn serve(workspace_root: &std::path::Path, cli_options: CliOptions) -> anyhow::Result<()> {
    let config = config::load_config(workspace_root, cli_options)?;
    tracing::info!(
        root = %workspace_root.display(),
        reasoner = ?config.reasoner.kind,
        max_iterations = config.supervisor.max_iterations,
        "Starting session server"
    );

    let runtime = Runtime::from_config(&config);
    let stdin = BufReader::new(tokio::io::stdin());
    let result = conductor::session::serve(
        runtime.router.clone(),
        runtime.bus.clone(),
        stdin,
        tokio::io::stdout(),
    )
    .await;

    runtime.shutdown().await;
    result.map_err(Into::into)
}
