//! Keyspace topology: which shards exist and which key ranges they own
//!
//! The router never talks to a topology service directly; it goes through
//! the [`Topology`] trait so deployments can plug in their own source of
//! truth. [`StaticTopology`] serves a fixed layout from configuration.

mod errors;
mod key_range;
mod resolve;
mod srv_keyspace;

pub use errors::{ResolveError, TopoError, TopoResult};
pub use key_range::{check_partition, KeyRange, KeyspaceId};
pub use resolve::{any_shard, shard_for_keyspace_id};
pub use srv_keyspace::{
    KeyspaceTopology, ShardReference, SrvKeyspace, StaticTopology, Topology, TopologySource,
};
