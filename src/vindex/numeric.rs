//! Numeric vindex: the value itself is the keyspace id

use futures_util::future::BoxFuture;

use super::errors::{VindexError, VindexResult};
use super::{VCursor, Vindex};
use crate::sqltypes::Value;
use crate::topology::KeyspaceId;

#[derive(Debug, Clone)]
pub struct NumericVindex {
    name: String,
}

impl NumericVindex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Vindex for NumericVindex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "numeric"
    }

    fn cost(&self) -> u32 {
        0
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn map<'a>(
        &'a self,
        _cursor: &'a dyn VCursor,
        values: &'a [Value],
    ) -> BoxFuture<'a, VindexResult<Vec<Vec<KeyspaceId>>>> {
        let mapped = values
            .iter()
            .map(|v| match v.to_u64() {
                Some(n) => Ok(vec![KeyspaceId::from_u64(n)]),
                None => Err(VindexError::Convert {
                    vindex: "numeric",
                    value: v.to_string(),
                }),
            })
            .collect();
        Box::pin(async move { mapped })
    }
}
