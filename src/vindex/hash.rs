//! Hash vindex: keyspace id derived from a digest of the numeric value

use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};

use super::errors::{VindexError, VindexResult};
use super::{VCursor, Vindex};
use crate::sqltypes::Value;
use crate::topology::KeyspaceId;

/// Unique functional vindex spreading integers evenly over the keyspace
#[derive(Debug, Clone)]
pub struct HashVindex {
    name: String,
}

impl HashVindex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Keyspace id for an unsigned value: first 8 bytes of SHA-256 over its
/// big-endian encoding.
pub fn hash_u64(v: u64) -> KeyspaceId {
    let digest = Sha256::digest(v.to_be_bytes());
    KeyspaceId::new(&digest[..8])
}

pub(crate) fn hash_value(value: &Value) -> VindexResult<KeyspaceId> {
    value
        .to_u64()
        .map(hash_u64)
        .ok_or_else(|| VindexError::Convert {
            vindex: "hash",
            value: value.to_string(),
        })
}

impl Vindex for HashVindex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "hash"
    }

    fn cost(&self) -> u32 {
        1
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
            .map(|v| hash_value(v).map(|ksid| vec![ksid]))
            .collect();
        Box::pin(async move { mapped })
    }
}
