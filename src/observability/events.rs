//! Routing events
//!
//! Every line the router logs is one of these, so log consumers can match
//! on a closed set of names.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,
    ConfigRejected,
    VSchemaUpdated,

    // Planning
    QueryPlanned,
    QueryRejected,

    // Execution
    ScatterBegin,
    ScatterComplete,
    ShardRetry,
    ShardFailed,
    LookupIssued,
    JoinFieldProbe,
    QueryCancelled,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ConfigRejected => "CONFIG_REJECTED",
            Event::VSchemaUpdated => "VSCHEMA_UPDATED",
            Event::QueryPlanned => "QUERY_PLANNED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::ScatterBegin => "SCATTER_BEGIN",
            Event::ScatterComplete => "SCATTER_COMPLETE",
            Event::ShardRetry => "SHARD_RETRY",
            Event::ShardFailed => "SHARD_FAILED",
            Event::LookupIssued => "LOOKUP_ISSUED",
            Event::JoinFieldProbe => "JOIN_FIELD_PROBE",
            Event::QueryCancelled => "QUERY_CANCELLED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ScatterBegin | Event::LookupIssued | Event::JoinFieldProbe => Severity::Trace,
            Event::ShardRetry | Event::QueryRejected | Event::QueryCancelled => Severity::Warn,
            Event::ShardFailed | Event::ConfigRejected => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
