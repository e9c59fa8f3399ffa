//! VSchema error types

use thiserror::Error;

use crate::vindex::VindexError;

/// Result type for vschema operations
pub type VSchemaResult<T> = Result<T, VSchemaError>;

#[derive(Debug, Error)]
pub enum VSchemaError {
    #[error("keyspace {keyspace}: vindex {vindex}: {source}")]
    Vindex {
        keyspace: String,
        vindex: String,
        #[source]
        source: VindexError,
    },

    #[error("keyspace {keyspace}: table {table}: vindex {vindex} not found")]
    UnknownVindex {
        keyspace: String,
        table: String,
        vindex: String,
    },

    #[error("keyspace {keyspace}: table {table}: missing primary vindex")]
    MissingPrimaryVindex { keyspace: String, table: String },

    #[error("keyspace {keyspace}: table {table}: primary vindex {vindex} is not unique")]
    NonUniquePrimary {
        keyspace: String,
        table: String,
        vindex: String,
    },

    #[error("keyspace {keyspace}: unsharded keyspace cannot define vindexes")]
    VindexInUnsharded { keyspace: String },

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("ambiguous table reference: {0}")]
    AmbiguousTable(String),

    #[error("keyspace {0} not found")]
    KeyspaceNotFound(String),
}
