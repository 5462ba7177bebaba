//! Portal CLI - job portal backend client

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Command-line client for the job portal")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// State directory for config, session and logs
    #[arg(short = 'd', long, global = true, env = "PORTAL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Configuration file (defaults to <state dir>/config/portal.json when present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "60")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let state_dir = config::state_dir(cli.state_dir.clone());
    logging::init_logging(cli.log_level.into(), &state_dir, cli.no_file_log)?;

    info!("Starting portal CLI");

    let context = commands::Context::new(state_dir, cli.config)?;

    // Execute command with optional timeout
    let outcome = if cli.timeout == 0 {
        Ok(cli.command.execute(&context).await)
    } else {
        let timeout_duration = Duration::from_secs(cli.timeout);
        tokio::time::timeout(timeout_duration, cli.command.execute(&context)).await
    };

    match outcome {
        Ok(Ok(())) => {
            info!("Command completed successfully");
        }
        Ok(Err(e)) => {
            error!("Command failed: {e:#}");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
        Err(_) => {
            error!("Command timed out after {} seconds", cli.timeout);
            eprintln!("Error: timed out after {} seconds", cli.timeout);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
