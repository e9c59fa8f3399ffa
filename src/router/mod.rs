//! Query routing and execution
//!
//! [`Router`] is the entry point: it plans each statement against the
//! current VSchema, resolves the shards every route targets and runs the
//! plan through the scatter connection.
//!
//! # Error stages
//!
//! Errors raised while resolving a route are prefixed with the stage that
//! produced them (`paramsSelectEqual`, `paramsSelectIN`, ...), so callers
//! can tell a missing bind variable from a topology outage.

mod context;
mod engine;
mod errors;
mod params;
#[allow(clippy::module_inception)]
mod router;

pub use context::{CancelHandle, QueryContext};
pub use errors::{RouterError, RouterErrorKind, RouterResult};
pub use router::Router;
