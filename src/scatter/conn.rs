//! The per-shard query interface the router executes through

use std::fmt;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;

use super::errors::ShardResult;
use crate::sqltypes::{BoundQuery, QueryResult};

/// One shard of one keyspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
}

impl Target {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.shard)
    }
}

/// Executes bound queries against individual shards.
///
/// Implementations wrap whatever client talks to the shard servers.
pub trait ShardConn: Send + Sync {
    fn execute<'a>(
        &'a self,
        target: &'a Target,
        query: &'a BoundQuery,
    ) -> BoxFuture<'a, ShardResult<QueryResult>>;

    /// Streams the result as a sequence of chunks into `sink`. The first
    /// chunk carries the fields. Returns once the stream is exhausted.
    fn stream_execute<'a>(
        &'a self,
        target: &'a Target,
        query: &'a BoundQuery,
        sink: mpsc::Sender<QueryResult>,
    ) -> BoxFuture<'a, ShardResult<()>>;
}
