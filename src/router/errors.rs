//! Router error types
//!
//! Every error a caller sees carries the stage that produced it, e.g.
//! `paramsSelectEqual: could not find bind var :id`. Layers add context;
//! none of them downgrade or swallow a failure.

use thiserror::Error;

use crate::planner::PlanError;
use crate::scatter::ScatterError;
use crate::sql::SqlError;
use crate::topology::{ResolveError, TopoError};
use crate::vindex::VindexError;

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Coarse classification of router failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterErrorKind {
    /// Statement shape, bind variables or shard resolution
    Planning,
    /// Keyspace metadata could not be fetched
    Topology,
    /// The backing query of a lookup vindex failed
    Lookup,
    /// A shard failed after retries
    Execution,
    /// The request was cancelled or ran out of time
    Cancelled,
}

impl RouterErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            RouterErrorKind::Planning => "SHARDGATE_PLANNING_ERROR",
            RouterErrorKind::Topology => "SHARDGATE_TOPOLOGY_ERROR",
            RouterErrorKind::Lookup => "SHARDGATE_LOOKUP_ERROR",
            RouterErrorKind::Execution => "SHARDGATE_EXECUTION_ERROR",
            RouterErrorKind::Cancelled => "SHARDGATE_CANCELLED",
        }
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Syntax(#[from] SqlError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("query \"{0}\" cannot be used for streaming")]
    NotStreamable(String),

    #[error("{stage}: keyspace {keyspace} fetch error: {source}")]
    Topology {
        stage: &'static str,
        keyspace: String,
        #[source]
        source: TopoError,
    },

    #[error("unsharded keyspace {0} has multiple shards")]
    UnshardedMultipleShards(String),

    #[error("{stage}: {source}")]
    Resolve {
        stage: &'static str,
        #[source]
        source: ResolveError,
    },

    #[error("{stage}: {source}")]
    Vindex {
        stage: &'static str,
        #[source]
        source: VindexError,
    },

    #[error("{stage}: could not find bind var :{name}")]
    MissingBindVar { stage: &'static str, name: String },

    #[error("{stage}: {message}")]
    InvalidBindVar { stage: &'static str, message: String },

    #[error("{stage}: {message}")]
    Unroutable { stage: &'static str, message: String },

    #[error(transparent)]
    Scatter(#[from] ScatterError),

    /// Failure raised outside a shard connection, e.g. by a lookup cursor
    #[error("{0}")]
    Execution(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl RouterError {
    pub fn kind(&self) -> RouterErrorKind {
        match self {
            RouterError::Syntax(_)
            | RouterError::Plan(_)
            | RouterError::NotStreamable(_)
            | RouterError::UnshardedMultipleShards(_)
            | RouterError::Resolve { .. }
            | RouterError::MissingBindVar { .. }
            | RouterError::InvalidBindVar { .. }
            | RouterError::Unroutable { .. } => RouterErrorKind::Planning,
            RouterError::Topology { .. } => RouterErrorKind::Topology,
            RouterError::Vindex {
                source: VindexError::Lookup(_),
                ..
            } => RouterErrorKind::Lookup,
            RouterError::Vindex { .. } => RouterErrorKind::Planning,
            RouterError::Scatter(ScatterError::SinkClosed)
            | RouterError::Cancelled
            | RouterError::DeadlineExceeded => RouterErrorKind::Cancelled,
            RouterError::Scatter(_) | RouterError::Execution(_) => RouterErrorKind::Execution,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}
