//! Topology error types

use thiserror::Error;

use super::key_range::KeyspaceId;

/// Result type for topology lookups
pub type TopoResult<T> = Result<T, TopoError>;

/// Failures fetching or interpreting keyspace topology
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopoError {
    #[error("keyspace {0} not found")]
    KeyspaceNotFound(String),

    /// The topology service could not be reached or answered with an error
    #[error("topo error {0}")]
    Unavailable(String),

    #[error("invalid key range {shard:?}: {reason}")]
    InvalidKeyRange { shard: String, reason: String },
}

impl TopoError {
    pub fn invalid_key_range(shard: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKeyRange {
            shard: shard.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure mapping a keyspace id onto a shard
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("KeyspaceId {0} didn't match any shards")]
    NoMatch(KeyspaceId),

    #[error("KeyspaceId {0} matched multiple shards")]
    MultipleMatches(KeyspaceId),
}
