//! CLI definitions for hostcore.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// hostcore CLI.
#[derive(Parser)]
#[command(name = "hostcore")]
#[command(about = "Bookkeeping core for a single-threaded execution host")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long, global = true, env = "HOSTCORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for rolling log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Load and validate the configuration
    CheckConfig,

    /// Drive a host instance through a synthetic workload and print metrics
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SimulateArgs {
    /// Nesting depth of callback scopes
    #[arg(long, default_value_t = 8)]
    pub depth: usize,

    /// Background jobs to submit
    #[arg(long, default_value_t = 16)]
    pub jobs: usize,

    /// Deferred callbacks to schedule
    #[arg(long, default_value_t = 8)]
    pub deferred: usize,

    /// Cleanup hooks to register
    #[arg(long, default_value_t = 4)]
    pub hooks: usize,

    /// Cancel every Nth background job
    #[arg(long)]
    pub cancel_every: Option<usize>,
}
