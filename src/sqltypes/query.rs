//! Bound queries: the unit of work sent to a single shard

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Bind variables keyed by name (without the leading `:`).
///
/// Ordered so rendered queries and logs are deterministic.
pub type BindVars = BTreeMap<String, Value>;

/// SQL text paired with the bind variables it references
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundQuery {
    pub sql: String,
    pub bind_vars: BindVars,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, bind_vars: BindVars) -> Self {
        Self {
            sql: sql.into(),
            bind_vars,
        }
    }

    /// Query without bind variables
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::new(sql, BindVars::new())
    }
}

/// Builds a `BindVars` map from `(name, value)` pairs.
pub fn bind_vars<I, K, V>(pairs: I) -> BindVars
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
