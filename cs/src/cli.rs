//! CLI argument parsing for the `cs` inspection tool

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version, about = "Inspect and edit Chomka persisted state", long_about = None)]
pub struct Cli {
    /// Data directory (default: ./shared_data)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a state value as JSON
    Get {
        /// State key
        #[arg(required = true)]
        key: String,
    },

    /// Set a state value
    Set {
        /// State key
        #[arg(required = true)]
        key: String,

        /// Value as JSON (bare words are stored as strings)
        #[arg(required = true)]
        value: String,
    },

    /// Print a file from the data directory
    Read {
        /// File name
        #[arg(required = true)]
        name: String,
    },

    /// Record a drag position in the coordinate cache
    Coords {
        /// Item id
        #[arg(required = true)]
        id: String,

        /// X position
        #[arg(required = true, allow_negative_numbers = true)]
        x: f64,

        /// Y position
        #[arg(required = true, allow_negative_numbers = true)]
        y: f64,
    },

    /// Show the coordinate cache
    Layout,
}
