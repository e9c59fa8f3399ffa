//! Shard execution: the connection interface, bounded retries and
//! concurrent scatter/gather across shards.

mod conn;
mod errors;
mod retry;
mod scatter;

pub use conn::{ShardConn, Target};
pub use errors::{ScatterError, ScatterResult, ShardError, ShardErrorKind, ShardResult};
pub use retry::{RetryPolicy, RetryingConn};
pub use scatter::ScatterConn;
