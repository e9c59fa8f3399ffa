//! Observability for the router
//!
//! - Structured logging (JSON lines)
//! - Typed routing events
//! - Atomic counters per router
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on routing
//! 3. No background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use shardgate::observability::{log_event, Event};
//!
//! log_event(Event::ShardRetry, &[("target", "ks.-80"), ("attempt", "1")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, RouterMetrics};
pub use scope::{ObservationScope, Timer};

/// Logs a routing event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
