//! Shard connection and scatter errors

use thiserror::Error;

use super::conn::Target;

/// Result type for a single shard call
pub type ShardResult<T> = Result<T, ShardError>;

/// Result type for scatter operations
pub type ScatterResult<T> = Result<T, ScatterError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardErrorKind {
    /// Connection-level failure that may succeed on another attempt
    Transient,
    /// The shard rejected the query; never retried
    Fatal,
    /// The attempt did not finish in time
    Timeout,
}

/// Failure reported by a shard connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ShardError {
    pub kind: ShardErrorKind,
    pub message: String,
}

impl ShardError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ShardErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ShardErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ShardErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ShardErrorKind::Transient | ShardErrorKind::Timeout)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ScatterError {
    #[error("target: {target}: {source}")]
    Shard {
        target: Target,
        #[source]
        source: ShardError,
    },

    #[error("target: {target}: fields differ from other shards")]
    FieldMismatch { target: Target },

    #[error("result stream closed by receiver")]
    SinkClosed,
}

impl ScatterError {
    pub fn shard(target: &Target, source: ShardError) -> Self {
        ScatterError::Shard {
            target: target.clone(),
            source,
        }
    }
}
