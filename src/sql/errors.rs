//! SQL parse errors

use thiserror::Error;

/// Result type for parsing
pub type SqlResult<T> = Result<T, SqlError>;

/// Syntax error with the byte offset it was detected at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at position {position}: {message}")]
pub struct SqlError {
    pub position: usize,
    pub message: String,
}

impl SqlError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}
