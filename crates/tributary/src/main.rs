//! Tributary - Buffered streaming writes into append-only warehouse tables
//!
//! # Usage
//!
//! ```bash
//! # Stream NDJSON rows into a table (written as JSON lines under ./out)
//! tributary ingest --table proj.analytics.events --input events.ndjson
//! cat events.ndjson | tributary ingest --table proj.analytics.events
//!
//! # Validate a config file
//! tributary --config configs/config.toml check
//! ```

mod cmd;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tributary_config::{Config, LogFormat};

/// Tributary - Buffered streaming writes into append-only warehouse tables
#[derive(Parser, Debug)]
#[command(name = "tributary")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true, env = "TRIBUTARY_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream NDJSON rows into a destination table
    Ingest(cmd::ingest::IngestArgs),

    /// Validate a configuration file
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ingest(args) => {
            let config = load_config(cli.config.as_deref())?;
            let directive = config.log.directive(cli.log_level.as_deref());
            init_logging(&directive, config.log.format)?;
            cmd::ingest::run(args, config).await
        }
        // Check doesn't need logging - just outputs to stdout
        Command::Check => cmd::check::run(cli.config.as_deref()),
    }
}

/// Load the config file if one was given, defaults otherwise
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).context("failed to load configuration")
        }
        None => Ok(Config::default()),
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(directive: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}
