//! VSchema: keyspaces, their tables, and the vindexes that route them
//!
//! The configuration form ([`VSchemaSource`]) is validated once into an
//! immutable [`VSchema`]. Requests hold an `Arc<VSchema>` for their whole
//! lifetime, so swapping in a new snapshot never affects in-flight work.

mod errors;
mod schema;
mod source;

pub use errors::{VSchemaError, VSchemaResult};
pub use schema::{ColumnVindex, Keyspace, Table, VSchema};
pub use source::{ColumnVindexSource, KeyspaceSource, TableSource, VSchemaSource, VindexSource};
