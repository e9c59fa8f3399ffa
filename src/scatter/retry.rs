//! Bounded retry for shard calls
//!
//! Transient failures and attempt timeouts are retried with exponential
//! backoff, capped per delay and bounded by an overall time budget.
//! A stream is only retried while nothing has been forwarded from it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use super::conn::{ShardConn, Target};
use super::errors::{ShardError, ShardResult};
use crate::observability::{log_event, Event, RouterMetrics};
use crate::sqltypes::{BoundQuery, QueryResult};

const MAX_BACKOFF_SHIFT: u32 = 5;
const STREAM_BUFFER: usize = 16;

/// Retry tunables. Durations are configured in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Upper bound for one `execute` attempt
    #[serde(rename = "attempt_timeout_ms", with = "duration_ms")]
    pub attempt_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(rename = "initial_backoff_ms", with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,
    /// No retry is started once this much time has passed since the first attempt
    #[serde(rename = "total_budget_ms", with = "duration_ms")]
    pub total_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            total_budget: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Fails on a policy that can never complete an attempt
    pub fn validate(&self) -> Result<(), String> {
        if self.attempt_timeout.is_zero() {
            return Err("attempt_timeout_ms must be > 0".into());
        }
        if self.max_backoff < self.initial_backoff {
            return Err("max_backoff_ms must be >= initial_backoff_ms".into());
        }
        if self.total_budget < self.attempt_timeout {
            return Err("total_budget_ms must be >= attempt_timeout_ms".into());
        }
        Ok(())
    }

    /// Delay before retry number `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        self.initial_backoff
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Wraps a connection with a [`RetryPolicy`]
pub struct RetryingConn {
    inner: Arc<dyn ShardConn>,
    policy: RetryPolicy,
    metrics: Arc<RouterMetrics>,
}

impl RetryingConn {
    pub fn new(inner: Arc<dyn ShardConn>, policy: RetryPolicy, metrics: Arc<RouterMetrics>) -> Self {
        Self {
            inner,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sleeps before the next attempt, or returns false if `err` is final
    async fn wait_retry(
        &self,
        target: &Target,
        err: &ShardError,
        attempt: u32,
        deadline: Instant,
    ) -> bool {
        if !err.is_retryable() || attempt >= self.policy.max_retries {
            return false;
        }
        let delay = self.policy.backoff(attempt);
        if Instant::now() + delay >= deadline {
            return false;
        }

        self.metrics.increment_retries();
        log_event(
            Event::ShardRetry,
            &[
                ("target", &target.to_string()),
                ("attempt", &(attempt + 1).to_string()),
                ("delay_ms", &delay.as_millis().to_string()),
                ("error", &err.message),
            ],
        );
        time::sleep(delay).await;
        true
    }
}

impl ShardConn for RetryingConn {
    fn execute<'a>(
        &'a self,
        target: &'a Target,
        query: &'a BoundQuery,
    ) -> BoxFuture<'a, ShardResult<QueryResult>> {
        Box::pin(async move {
            let deadline = Instant::now() + self.policy.total_budget;
            let mut attempt = 0;
            loop {
                let result = match time::timeout(
                    self.policy.attempt_timeout,
                    self.inner.execute(target, query),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ShardError::timeout(format!(
                        "attempt timed out after {}ms",
                        self.policy.attempt_timeout.as_millis()
                    ))),
                };
                match result {
                    Ok(result) => return Ok(result),
                    Err(err) => {
                        if !self.wait_retry(target, &err, attempt, deadline).await {
                            return Err(err);
                        }
                    }
                }
                attempt += 1;
            }
        })
    }

    fn stream_execute<'a>(
        &'a self,
        target: &'a Target,
        query: &'a BoundQuery,
        sink: mpsc::Sender<QueryResult>,
    ) -> BoxFuture<'a, ShardResult<()>> {
        Box::pin(async move {
            let deadline = Instant::now() + self.policy.total_budget;
            let mut attempt = 0;
            loop {
                let (tx, mut rx) = mpsc::channel::<QueryResult>(STREAM_BUFFER);
                let sink = &sink;
                let forward = async move {
                    let mut forwarded = false;
                    while let Some(chunk) = rx.recv().await {
                        forwarded = true;
                        if sink.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    forwarded
                };
                let (result, forwarded) =
                    tokio::join!(self.inner.stream_execute(target, query, tx), forward);
                match result {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        if forwarded || !self.wait_retry(target, &err, attempt, deadline).await {
                            return Err(err);
                        }
                    }
                }
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::sqltypes::Value;

    /// Fails the first `failures` calls with `error`
    struct FlakyConn {
        failures: u32,
        error: ShardError,
        calls: AtomicU32,
        /// Rows streamed before failing
        partial: bool,
    }

    impl FlakyConn {
        fn new(failures: u32, error: ShardError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                partial: false,
            }
        }

        fn fail_now(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
        }
    }

    fn one_row() -> QueryResult {
        QueryResult {
            rows: vec![vec![Value::Int64(1)]],
            rows_affected: 1,
            ..QueryResult::default()
        }
    }

    impl ShardConn for FlakyConn {
        fn execute<'a>(
            &'a self,
            _target: &'a Target,
            _query: &'a BoundQuery,
        ) -> BoxFuture<'a, ShardResult<QueryResult>> {
            Box::pin(async move {
                if self.fail_now() {
                    Err(self.error.clone())
                } else {
                    Ok(one_row())
                }
            })
        }

        fn stream_execute<'a>(
            &'a self,
            _target: &'a Target,
            _query: &'a BoundQuery,
            sink: mpsc::Sender<QueryResult>,
        ) -> BoxFuture<'a, ShardResult<()>> {
            Box::pin(async move {
                if self.fail_now() {
                    if self.partial {
                        let _ = sink.send(one_row()).await;
                    }
                    return Err(self.error.clone());
                }
                sink.send(one_row())
                    .await
                    .map_err(|_| ShardError::fatal("closed"))
            })
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_millis(200),
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            total_budget: Duration::from_secs(5),
        }
    }

    fn wrap(conn: Arc<FlakyConn>, policy: RetryPolicy) -> (RetryingConn, Arc<RouterMetrics>) {
        let metrics = Arc::new(RouterMetrics::new());
        (RetryingConn::new(conn, policy, Arc::clone(&metrics)), metrics)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(10));
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(80));
        assert_eq!(policy.backoff(4), Duration::from_millis(100));
        assert_eq!(policy.backoff(40), Duration::from_millis(100));
    }

    #[test]
    fn test_policy_serde_in_millis() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries": 5, "initial_backoff_ms": 3}"#).unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(3));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(10));

        let json = serde_json::to_value(RetryPolicy::default()).unwrap();
        assert_eq!(json["total_budget_ms"], 30000);
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        let bad = RetryPolicy {
            max_backoff: Duration::from_millis(1),
            initial_backoff: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        assert!(bad.validate().unwrap_err().contains("max_backoff_ms"));
        let bad = RetryPolicy {
            attempt_timeout: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let conn = Arc::new(FlakyConn::new(2, ShardError::transient("conn reset")));
        let (retrying, metrics) = wrap(Arc::clone(&conn), fast_policy(2));
        let target = Target::new("ks", "-80");
        let result = retrying
            .execute(&target, &BoundQuery::sql("select 1"))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(conn.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().shard_retries, 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let conn = Arc::new(FlakyConn::new(10, ShardError::transient("conn reset")));
        let (retrying, _) = wrap(Arc::clone(&conn), fast_policy(2));
        let err = retrying
            .execute(&Target::new("ks", "0"), &BoundQuery::sql("select 1"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "conn reset");
        assert_eq!(conn.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let conn = Arc::new(FlakyConn::new(1, ShardError::fatal("syntax error")));
        let (retrying, metrics) = wrap(Arc::clone(&conn), fast_policy(3));
        assert!(retrying
            .execute(&Target::new("ks", "0"), &BoundQuery::sql("select 1"))
            .await
            .is_err());
        assert_eq!(conn.calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().shard_retries, 0);
    }

    #[tokio::test]
    async fn test_budget_stops_retries() {
        let conn = Arc::new(FlakyConn::new(10, ShardError::transient("conn reset")));
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(50),
            total_budget: Duration::from_millis(200),
            attempt_timeout: Duration::from_millis(100),
            max_retries: 100,
        };
        let (retrying, _) = wrap(Arc::clone(&conn), policy);
        assert!(retrying
            .execute(&Target::new("ks", "0"), &BoundQuery::sql("select 1"))
            .await
            .is_err());
        let calls = conn.calls.load(Ordering::SeqCst);
        assert!((2..=5).contains(&calls), "calls = {}", calls);
    }

    #[tokio::test]
    async fn test_stream_retried_before_first_chunk() {
        let conn = Arc::new(FlakyConn::new(1, ShardError::transient("conn reset")));
        let (retrying, _) = wrap(Arc::clone(&conn), fast_policy(2));
        let (tx, mut rx) = mpsc::channel(4);
        retrying
            .stream_execute(&Target::new("ks", "0"), &BoundQuery::sql("select 1"), tx)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().rows.len(), 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_not_retried_after_forwarding() {
        let mut flaky = FlakyConn::new(1, ShardError::transient("conn reset"));
        flaky.partial = true;
        let conn = Arc::new(flaky);
        let (retrying, _) = wrap(Arc::clone(&conn), fast_policy(2));
        let (tx, mut rx) = mpsc::channel(4);
        let err = retrying
            .stream_execute(&Target::new("ks", "0"), &BoundQuery::sql("select 1"), tx)
            .await
            .unwrap_err();
        assert_eq!(err.message, "conn reset");
        assert_eq!(conn.calls.load(Ordering::SeqCst), 1);
        assert!(rx.recv().await.is_some());
    }
}
