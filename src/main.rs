use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use model_runner::cli::{self, Cli};
use model_runner::config::RunnerConfig;

fn main() -> Result<()> {
    let args = Cli::parse();

    // Logs go to stderr; stdout carries infer results
    let log_level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let Some(command) = args.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Load configuration
    let config = if let Some(config_path) = args.config {
        RunnerConfig::load_from_file(&config_path)?
    } else {
        RunnerConfig::load_default()?
    };

    cli::execute(command, &config)
}
