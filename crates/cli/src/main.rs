//! sitecheck CLI - Main Entry Point
//!
//! Runs, lists and validates YAML scenarios against a deployed website.
//! Exit code is 0 when no scenario failed, 1 when at least one did, and 2
//! when the run could not happen at all.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sitecheck_e2e::RunnerConfig;

mod commands;
mod output;

use commands::{list, run, validate};

/// sitecheck - scenario-based end-to-end checks for websites
#[derive(Parser)]
#[command(name = "sitecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "sitecheck.toml", env = "SITECHECK_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios
    Run(run::RunArgs),

    /// List scenarios
    List(list::ListArgs),

    /// Check scenarios without running them
    Validate(validate::ValidateArgs),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = RunnerConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::List(args) => {
            list::execute(args, &config, cli.format)?;
            Ok(0)
        }
        Commands::Validate(args) => {
            validate::execute(args, config)?;
            Ok(0)
        }
        Commands::Version => {
            println!("sitecheck v{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            2
        }
    };

    std::process::exit(code);
}
