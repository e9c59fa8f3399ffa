//! Router configuration
//!
//! One JSON document holds the VSchema, the static topology and the
//! shard retry policy:
//!
//! ```json
//! {
//!   "vschema": { "keyspaces": { "main": { "tables": { "t": {} } } } },
//!   "topology": { "keyspaces": { "main": { "shards": ["0"] } } },
//!   "retry": { "max_retries": 2 }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event, Event};
use crate::router::Router;
use crate::scatter::{RetryPolicy, ScatterConn, ShardConn};
use crate::topology::{check_partition, KeyRange, StaticTopology, TopoError, TopologySource};
use crate::vschema::{VSchema, VSchemaError, VSchemaSource};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("vschema: {0}")]
    VSchema(#[from] VSchemaError),

    #[error("topology: {0}")]
    Topology(#[from] TopoError),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub vschema: VSchemaSource,
    pub topology: TopologySource,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl RouterConfig {
    /// Loads and validates a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = match Self::from_json(&content) {
            Ok(config) => config,
            Err(err) => {
                log_event(
                    Event::ConfigRejected,
                    &[("path", &path.display().to_string()), ("error", &err.to_string())],
                );
                return Err(err);
            }
        };
        log_event(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("keyspaces", &config.vschema.keyspaces.len().to_string()),
            ],
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: RouterConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every keyspace is served and that shard layouts are
    /// consistent with how the keyspace is sharded
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vschema.keyspaces.is_empty() {
            return Err(ConfigError::Invalid("vschema defines no keyspaces".into()));
        }

        for (name, keyspace) in &self.vschema.keyspaces {
            let served = self.topology.keyspaces.get(name).ok_or_else(|| {
                ConfigError::Invalid(format!("keyspace {} has no topology entry", name))
            })?;
            if served.shards.is_empty() {
                return Err(ConfigError::Invalid(format!("keyspace {} has no shards", name)));
            }

            if !keyspace.sharded {
                if served.shards.len() != 1 {
                    return Err(ConfigError::Invalid(format!(
                        "unsharded keyspace {} has multiple shards",
                        name
                    )));
                }
                continue;
            }

            let ranges = served
                .shards
                .iter()
                .map(|s| KeyRange::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            check_partition(&ranges)
                .map_err(|reason| ConfigError::Invalid(format!("keyspace {}: {}", name, reason)))?;
        }

        self.retry
            .validate()
            .map_err(|reason| ConfigError::Invalid(format!("retry: {}", reason)))?;

        // builds every vindex, so unknown types surface here
        VSchema::build(&self.vschema)?;
        Ok(())
    }

    pub fn build_vschema(&self) -> ConfigResult<VSchema> {
        Ok(VSchema::build(&self.vschema)?)
    }

    pub fn build_topology(&self) -> ConfigResult<StaticTopology> {
        Ok(StaticTopology::build(&self.topology)?)
    }

    /// Wires a router over `conn` using this configuration
    pub fn build_router(&self, conn: Arc<dyn ShardConn>) -> ConfigResult<Router> {
        let vschema = self.build_vschema()?;
        let topology = Arc::new(self.build_topology()?);
        let scatter = ScatterConn::new(conn, self.retry.clone());
        Ok(Router::new(vschema, topology, scatter))
    }
}
