//! Serving keyspace metadata and the topology service seam

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::errors::{TopoError, TopoResult};
use super::key_range::KeyRange;

/// A shard as seen by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardReference {
    pub name: String,
    pub key_range: KeyRange,
}

impl ShardReference {
    pub fn parse(name: &str) -> TopoResult<Self> {
        Ok(Self {
            name: name.to_string(),
            key_range: KeyRange::parse(name)?,
        })
    }
}

/// Shards currently serving a keyspace, in configured order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvKeyspace {
    pub name: String,
    pub shards: Vec<ShardReference>,
}

impl SrvKeyspace {
    pub fn shard_names(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.name.clone()).collect()
    }
}

/// Source of keyspace serving graphs.
///
/// Implementations must be safe to call concurrently from many requests.
pub trait Topology: Send + Sync {
    fn srv_keyspace<'a>(&'a self, keyspace: &'a str) -> BoxFuture<'a, TopoResult<Arc<SrvKeyspace>>>;
}

/// Per-keyspace entry of a static topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceTopology {
    pub shards: Vec<String>,
}

/// JSON form of a static topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySource {
    #[serde(default)]
    pub keyspaces: BTreeMap<String, KeyspaceTopology>,
}

/// In-memory topology built once from configuration
#[derive(Debug, Default)]
pub struct StaticTopology {
    keyspaces: HashMap<String, Arc<SrvKeyspace>>,
}

impl StaticTopology {
    pub fn build(source: &TopologySource) -> TopoResult<Self> {
        let mut keyspaces = HashMap::with_capacity(source.keyspaces.len());
        for (name, ks) in &source.keyspaces {
            let shards = ks
                .shards
                .iter()
                .map(|s| ShardReference::parse(s))
                .collect::<TopoResult<Vec<_>>>()?;
            keyspaces.insert(
                name.clone(),
                Arc::new(SrvKeyspace {
                    name: name.clone(),
                    shards,
                }),
            );
        }
        Ok(Self { keyspaces })
    }

    pub fn keyspace_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.keyspaces.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Topology for StaticTopology {
    fn srv_keyspace<'a>(&'a self, keyspace: &'a str) -> BoxFuture<'a, TopoResult<Arc<SrvKeyspace>>> {
        let found = self
            .keyspaces
            .get(keyspace)
            .cloned()
            .ok_or_else(|| TopoError::KeyspaceNotFound(keyspace.to_string()));
        Box::pin(async move { found })
    }
}
