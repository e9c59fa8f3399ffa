//! CLI error types
//!
//! Every variant maps to a stable code; `main` prints the error and exits
//! with a non-zero status.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    IoError,
    /// Malformed request line
    BadRequest,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SHARDGATE_CLI_CONFIG_ERROR",
            Self::IoError => "SHARDGATE_CLI_IO_ERROR",
            Self::BadRequest => "SHARDGATE_CLI_BAD_REQUEST",
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("SHARDGATE_CLI_CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    #[error("SHARDGATE_CLI_IO_ERROR: {0}")]
    Io(#[from] io::Error),

    #[error("SHARDGATE_CLI_IO_ERROR: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SHARDGATE_CLI_BAD_REQUEST: {0}")]
    BadRequest(String),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        CliError::BadRequest(msg.into())
    }

    pub fn code(&self) -> CliErrorCode {
        match self {
            CliError::Config(_) => CliErrorCode::ConfigError,
            CliError::Io(_) | CliError::Json(_) => CliErrorCode::IoError,
            CliError::BadRequest(_) => CliErrorCode::BadRequest,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().code()
    }

    /// Error text without the code prefix
    pub fn message(&self) -> String {
        match self {
            CliError::Config(e) => e.to_string(),
            CliError::Io(e) => e.to_string(),
            CliError::Json(e) => format!("JSON error: {}", e),
            CliError::BadRequest(msg) => msg.clone(),
        }
    }
}
