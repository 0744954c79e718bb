// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pitchscrape_runtime::cli;
use pitchscrape_runtime::cli::scrape_cmd::ScrapeArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pitchscrape",
    about = "pitchscrape: resilient football match scraper",
    version,
    after_help = "Run 'pitchscrape <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every finished match of a league season
    Scrape(ScrapeArgs),
    /// Inspect or discard a job's checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Show the saved progress of a job
    Show {
        /// Job name (e.g. "england-premier-league-2023-2024")
        #[arg(long)]
        name: String,
        /// Directory holding results and checkpoints
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Delete a job's checkpoint so the next run starts over
    Clear {
        /// Job name
        #[arg(long)]
        name: String,
        /// Directory holding results and checkpoints
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(cli::output::QUIET_ENV, "1");
    }
    let level = if cli.quiet && cli.log_level == "info" {
        "warn"
    } else {
        cli.log_level.as_str()
    };
    init_logging(level, cli.log_format)?;

    let result = match cli.command {
        Commands::Scrape(args) => cli::scrape_cmd::run(args).await,
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Show { name, output_dir } => {
                cli::checkpoint_cmd::run_show(&name, output_dir).await
            }
            CheckpointAction::Clear { name, output_dir } => {
                cli::checkpoint_cmd::run_clear(&name, output_dir).await
            }
        },
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pitchscrape", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
