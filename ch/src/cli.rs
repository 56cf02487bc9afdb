//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chomka - desktop shell host for the Chomka web UI
#[derive(Parser)]
#[command(
    name = "chomka",
    about = "Desktop shell host: graceful shutdown and serialized persistence for the Chomka UI",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Override the configured data directory
    #[arg(short, long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the window host over stdin/stdout (default)
    Run,

    /// Print a persisted state value
    State {
        /// State key
        key: String,
    },

    /// Print the desktop layout with cached positions applied
    Layout,
}
