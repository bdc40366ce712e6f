//! Pacer - multi-agent coaching orchestrator
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use settings::{LogFormat, LoggingConfig};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod cli;
mod loader;
mod settings;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = loader::load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging)?;

    app::run(cli, config).await
}

/// Install the global subscriber; keep the guard alive to flush file output
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("Invalid log filter")?;

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Pretty => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    let (file, guard) = match &config.directory {
        Some(directory) => {
            let directory = if directory.is_relative() {
                pacer_core::store::data_dir()?.join(directory)
            } else {
                directory.clone()
            };
            let appender = tracing_appender::rolling::daily(directory, "pacer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(file)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
