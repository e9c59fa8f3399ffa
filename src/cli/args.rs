//! CLI argument definitions using clap
//!
//! Commands:
//! - shardgate validate --config <path>
//! - shardgate explain --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shardgate - SQL query router for sharded keyspaces
#[derive(Parser, Debug)]
#[command(name = "shardgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a router configuration
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./shardgate.json")]
        config: PathBuf,
    },

    /// Plan statements read from stdin, one JSON object per line
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./shardgate.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
