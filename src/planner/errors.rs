//! Planner error types
//!
//! Error codes:
//! - SHARDGATE_PLAN_UNSUPPORTED: statement shape the router cannot route
//! - SHARDGATE_PLAN_UNKNOWN_TABLE: table or keyspace missing from the vschema
//! - SHARDGATE_PLAN_UNKNOWN_SYMBOL: column qualifier matches no table in FROM

use std::fmt;

use crate::vschema::VSchemaError;

/// Planner error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorCode {
    Unsupported,
    UnknownTable,
    UnknownSymbol,
}

impl PlanErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PlanErrorCode::Unsupported => "SHARDGATE_PLAN_UNSUPPORTED",
            PlanErrorCode::UnknownTable => "SHARDGATE_PLAN_UNKNOWN_TABLE",
            PlanErrorCode::UnknownSymbol => "SHARDGATE_PLAN_UNKNOWN_SYMBOL",
        }
    }
}

impl fmt::Display for PlanErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planning failure. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanError {
    code: PlanErrorCode,
    message: String,
}

impl PlanError {
    /// Statement shape the router refuses to guess at
    pub fn unsupported(what: impl fmt::Display) -> Self {
        Self {
            code: PlanErrorCode::Unsupported,
            message: format!("unsupported: {}", what),
        }
    }

    pub fn unknown_symbol(symbol: impl fmt::Display) -> Self {
        Self {
            code: PlanErrorCode::UnknownSymbol,
            message: format!("symbol {} not found", symbol),
        }
    }

    pub fn code(&self) -> PlanErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<VSchemaError> for PlanError {
    fn from(err: VSchemaError) -> Self {
        Self {
            code: PlanErrorCode::UnknownTable,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PlanError {}

/// Result type for planner operations
pub type PlanResult<T> = Result<T, PlanError>;
