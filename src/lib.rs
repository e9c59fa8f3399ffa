//! shardgate - SQL query router for sharded keyspaces
//!
//! Statements are planned against a VSchema, mapped to shards through
//! vindexes and executed across shards with scatter/gather and
//! nested-loop joins.

pub mod cli;
pub mod config;
pub mod observability;
pub mod planner;
pub mod router;
pub mod scatter;
pub mod sql;
pub mod sqltypes;
pub mod topology;
pub mod vindex;
pub mod vschema;
