//! Vindex error types

use thiserror::Error;

use crate::router::RouterError;

/// Result type for vindex operations
pub type VindexResult<T> = Result<T, VindexError>;

#[derive(Debug, Error)]
pub enum VindexError {
    /// A value has no representation the vindex can map
    #[error("{vindex}.Map: could not convert {value}")]
    Convert { vindex: &'static str, value: String },

    /// The backing query of a lookup vindex failed
    #[error("lookup.Map {0}")]
    Lookup(#[source] Box<RouterError>),

    #[error("lookup.Map unexpected multiple results from vindex {vindex}: {value}")]
    MultipleResults { vindex: String, value: String },

    #[error("unknown vindex type {0}")]
    UnknownType(String),

    #[error("vindex {vindex}: missing param {param}")]
    MissingParam { vindex: String, param: &'static str },
}
