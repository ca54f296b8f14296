//! hostcore - bookkeeping core for a single-threaded execution host.
//!
//! Main entry point for the hostcore CLI.

mod cli;
mod cmd_check;
mod cmd_simulate;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use hostcore_config::{ConfigLoader, HostConfig};
use hostcore_core::fatal::{self, FatalPolicy};

use crate::cli::{Cli, Commands};

/// Initialize tracing with a console layer and, when `log_dir` is set, a
/// daily rolling file layer.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(default_level: &str, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("hostcore")
                .filename_suffix("log")
                .max_log_files(7)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        // Console output goes to stderr so stdout stays machine-readable.
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HostConfig> {
    match path {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(HostConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.logging.log_dir.as_ref().map(PathBuf::from));
    let _guard = init_tracing(&config.logging.level, log_dir.as_deref())?;
    info!("hostcore v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::CheckConfig => cmd_check::handle_check_config(&config, cli.config.as_deref()),
        Commands::Simulate(args) => {
            let policy = FatalPolicy::new(config.fatal.abort_on_uncaught_exception);
            match cmd_simulate::handle_simulate(config, args) {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => match e.as_fatal() {
                    Some(fatal_error) => fatal::terminate(fatal_error, policy),
                    None => Err(e.into()),
                },
            }
        }
    }
}
