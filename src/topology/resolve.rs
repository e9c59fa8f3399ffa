//! Mapping keyspace ids onto shards

use super::errors::ResolveError;
use super::key_range::KeyspaceId;
use super::srv_keyspace::{ShardReference, SrvKeyspace};

/// Returns the single shard whose key range contains `ksid`.
///
/// Overlapping ranges are a topology misconfiguration and are reported
/// rather than resolved arbitrarily.
pub fn shard_for_keyspace_id<'a>(
    srv: &'a SrvKeyspace,
    ksid: &KeyspaceId,
) -> Result<&'a ShardReference, ResolveError> {
    let mut matches = srv.shards.iter().filter(|s| s.key_range.contains(ksid));
    match (matches.next(), matches.next()) {
        (Some(shard), None) => Ok(shard),
        (None, _) => Err(ResolveError::NoMatch(ksid.clone())),
        (Some(_), Some(_)) => Err(ResolveError::MultipleMatches(ksid.clone())),
    }
}

/// First shard of the keyspace, used where any shard will do
pub fn any_shard(srv: &SrvKeyspace) -> Option<&ShardReference> {
    srv.shards.first()
}
