//! CLI module for shardgate
//!
//! Provides command-line interface for:
//! - validate: Load and check a router configuration
//! - explain: Plan statements read from stdin

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, explain_lines, run, run_command, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
