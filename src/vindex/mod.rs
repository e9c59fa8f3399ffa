//! Vindexes: functions from column values to keyspace ids
//!
//! Every vindex maps a batch of values to one list of keyspace ids per
//! value. Functional vindexes compute the id; lookup vindexes first ask a
//! backing table through a [`VCursor`], which lets the router route those
//! subordinate queries like any other statement.

mod errors;
mod hash;
mod lookup;
mod numeric;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::router::RouterResult;
use crate::sqltypes::{BoundQuery, QueryResult, Value};
use crate::topology::KeyspaceId;

pub use errors::{VindexError, VindexResult};
pub use hash::{hash_u64, HashVindex};
pub use lookup::LookupHashVindex;
pub use numeric::NumericVindex;

/// Executes the backing queries of lookup vindexes
pub trait VCursor: Send + Sync {
    fn execute_lookup<'a>(&'a self, query: BoundQuery) -> BoxFuture<'a, RouterResult<QueryResult>>;
}

pub trait Vindex: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Registered type name, e.g. `hash`
    fn kind(&self) -> &'static str;

    /// Relative routing cost; cheaper vindexes win when several apply
    fn cost(&self) -> u32;

    /// A unique vindex maps every value to at most one keyspace id
    fn is_unique(&self) -> bool;

    fn map<'a>(
        &'a self,
        cursor: &'a dyn VCursor,
        values: &'a [Value],
    ) -> BoxFuture<'a, VindexResult<Vec<Vec<KeyspaceId>>>>;
}

/// Instantiates a vindex by registered type name
pub fn create(
    kind: &str,
    name: &str,
    params: &BTreeMap<String, String>,
) -> VindexResult<Arc<dyn Vindex>> {
    match kind {
        "hash" => Ok(Arc::new(HashVindex::new(name))),
        "numeric" => Ok(Arc::new(NumericVindex::new(name))),
        "lookup_hash" => Ok(Arc::new(LookupHashVindex::new(name, params, false)?)),
        "lookup_hash_unique" => Ok(Arc::new(LookupHashVindex::new(name, params, true)?)),
        other => Err(VindexError::UnknownType(other.to_string())),
    }
}

/// Cursor for contexts where no lookup may be issued
#[cfg(test)]
pub(crate) struct NoCursor;

#[cfg(test)]
impl VCursor for NoCursor {
    fn execute_lookup<'a>(&'a self, query: BoundQuery) -> BoxFuture<'a, RouterResult<QueryResult>> {
        Box::pin(async move {
            Err(crate::router::RouterError::Execution(format!(
                "unexpected lookup {}",
                query.sql
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_types() {
        let v = create("hash", "user_index", &BTreeMap::new()).unwrap();
        assert_eq!(v.kind(), "hash");
        assert!(v.is_unique());
        let v = create("numeric", "n", &BTreeMap::new()).unwrap();
        assert_eq!(v.cost(), 0);
    }

    #[test]
    fn test_create_unknown_type() {
        let err = create("region", "r", &BTreeMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "unknown vindex type region");
    }
}
