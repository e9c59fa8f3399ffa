//! Concurrent fan-out of bound queries to shards
//!
//! Every shard request is issued at once. Buffered execution waits for all
//! of them and merges in request order; the first failure drops, and so
//! cancels, the requests still in flight.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::{mpsc, Mutex};

use super::conn::{ShardConn, Target};
use super::errors::{ScatterError, ScatterResult, ShardError};
use super::retry::{RetryPolicy, RetryingConn};
use crate::observability::{log_event, Event, ObservationScope, RouterMetrics};
use crate::sqltypes::{BoundQuery, QueryResult};

const STREAM_BUFFER: usize = 16;

pub struct ScatterConn {
    conn: RetryingConn,
    metrics: Arc<RouterMetrics>,
}

impl ScatterConn {
    pub fn new(conn: Arc<dyn ShardConn>, policy: RetryPolicy) -> Self {
        let metrics = Arc::new(RouterMetrics::new());
        Self {
            conn: RetryingConn::new(conn, policy, Arc::clone(&metrics)),
            metrics,
        }
    }

    /// Counters shared with the router owning this connection
    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.conn.policy()
    }

    /// Runs every request and merges the results in request order
    pub async fn execute(&self, requests: &[(Target, BoundQuery)]) -> ScatterResult<QueryResult> {
        let scope = self.begin(requests);
        let calls = requests.iter().map(|(target, query)| async move {
            self.conn
                .execute(target, query)
                .await
                .map(|result| (target, result))
                .map_err(|err| self.shard_failed(target, err))
        });

        match try_join_all(calls).await.and_then(merge_results) {
            Ok(result) => {
                scope.complete(&[("rows", &result.rows.len().to_string())]);
                Ok(result)
            }
            Err(err) => {
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    /// Streams every request into `sink` concurrently.
    ///
    /// The first chunk forwarded carries the fields; later chunks carry
    /// rows only. Each chunk's `rows_affected` is its row count.
    pub async fn stream_execute(
        &self,
        requests: &[(Target, BoundQuery)],
        sink: &mpsc::Sender<QueryResult>,
    ) -> ScatterResult<()> {
        let scope = self.begin(requests);
        let fields_sent = Mutex::new(false);
        let fields_sent = &fields_sent;

        let calls = requests.iter().map(|(target, query)| async move {
            let (tx, mut rx) = mpsc::channel::<QueryResult>(STREAM_BUFFER);
            let forward = async move {
                while let Some(chunk) = rx.recv().await {
                    // held across the send, so the chunk claiming the fields
                    // reaches the sink before any other shard's rows
                    let mut sent = fields_sent.lock().await;
                    let fields = if !*sent && !chunk.fields.is_empty() {
                        *sent = true;
                        chunk.fields
                    } else {
                        Vec::new()
                    };
                    if fields.is_empty() && chunk.rows.is_empty() {
                        continue;
                    }
                    let out = QueryResult {
                        fields,
                        rows_affected: chunk.rows.len() as u64,
                        rows: chunk.rows,
                        insert_id: chunk.insert_id,
                    };
                    if sink.send(out).await.is_err() {
                        return Err(ScatterError::SinkClosed);
                    }
                }
                Ok(())
            };
            let (result, forwarded) = tokio::join!(self.conn.stream_execute(target, query, tx), forward);
            forwarded?;
            result.map_err(|err| self.shard_failed(target, err))
        });

        match try_join_all(calls).await {
            Ok(_) => {
                scope.complete(&[]);
                Ok(())
            }
            Err(err) => {
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn begin(&self, requests: &[(Target, BoundQuery)]) -> ObservationScope {
        self.metrics.add_shard_queries(requests.len() as u64);
        let keyspace = requests
            .first()
            .map(|(t, _)| t.keyspace.clone())
            .unwrap_or_default();
        ObservationScope::with_fields(
            "SCATTER",
            vec![
                ("keyspace", keyspace),
                ("shards", requests.len().to_string()),
            ],
        )
    }

    fn shard_failed(&self, target: &Target, err: ShardError) -> ScatterError {
        self.metrics.increment_failures();
        log_event(
            Event::ShardFailed,
            &[("target", &target.to_string()), ("error", &err.message)],
        );
        ScatterError::shard(target, err)
    }
}

/// Concatenates rows, sums rows affected and keeps the last non-zero
/// insert id. Shards reporting fields must all report the same ones.
fn merge_results(results: Vec<(&Target, QueryResult)>) -> ScatterResult<QueryResult> {
    let mut merged = QueryResult::default();
    for (target, result) in results {
        if !result.fields.is_empty() {
            if merged.fields.is_empty() {
                merged.fields = result.fields;
            } else if merged.fields != result.fields {
                return Err(ScatterError::FieldMismatch {
                    target: target.clone(),
                });
            }
        }
        merged.rows.extend(result.rows);
        merged.rows_affected += result.rows_affected;
        if result.insert_id != 0 {
            merged.insert_id = result.insert_id;
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::future::BoxFuture;

    use crate::scatter::ShardResult;
    use crate::sqltypes::{Field, FieldType, Value};

    /// Returns a fixed result per shard and records every call
    #[derive(Default)]
    struct MapConn {
        results: BTreeMap<String, ShardResult<QueryResult>>,
        calls: Mutex<Vec<String>>,
        delay_ms: u64,
    }

    impl MapConn {
        fn result(&self, target: &Target) -> ShardResult<QueryResult> {
            self.calls.lock().unwrap().push(target.shard.clone());
            self.results
                .get(&target.shard)
                .cloned()
                .unwrap_or_else(|| Ok(QueryResult::default()))
        }
    }

    impl ShardConn for MapConn {
        fn execute<'a>(
            &'a self,
            target: &'a Target,
            _query: &'a BoundQuery,
        ) -> BoxFuture<'a, ShardResult<QueryResult>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                self.result(target)
            })
        }

        fn stream_execute<'a>(
            &'a self,
            target: &'a Target,
            _query: &'a BoundQuery,
            sink: mpsc::Sender<QueryResult>,
        ) -> BoxFuture<'a, ShardResult<()>> {
            Box::pin(async move {
                let result = self.result(target)?;
                let fields = QueryResult::with_fields(result.fields.clone());
                sink.send(fields).await.map_err(|_| ShardError::fatal("closed"))?;
                for row in result.rows {
                    let chunk = QueryResult {
                        rows: vec![row],
                        ..QueryResult::default()
                    };
                    sink.send(chunk).await.map_err(|_| ShardError::fatal("closed"))?;
                }
                Ok(())
            })
        }
    }

    fn id_fields() -> Vec<Field> {
        vec![Field::new("id", FieldType::Int64)]
    }

    fn rows(ids: &[i64], insert_id: u64) -> ShardResult<QueryResult> {
        Ok(QueryResult {
            fields: id_fields(),
            rows: ids.iter().map(|id| vec![Value::Int64(*id)]).collect(),
            rows_affected: ids.len() as u64,
            insert_id,
        })
    }

    fn requests(shards: &[&str]) -> Vec<(Target, BoundQuery)> {
        shards
            .iter()
            .map(|s| (Target::new("ks", *s), BoundQuery::sql("select id from t")))
            .collect()
    }

    fn scatter(conn: MapConn) -> ScatterConn {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        ScatterConn::new(Arc::new(conn), policy)
    }

    #[tokio::test]
    async fn test_execute_merges_in_request_order() {
        let mut conn = MapConn::default();
        conn.results.insert("-80".into(), rows(&[1, 2], 0));
        conn.results.insert("80-".into(), rows(&[3], 7));
        let sc = scatter(conn);

        let result = sc.execute(&requests(&["80-", "-80"])).await.unwrap();
        assert_eq!(result.fields, id_fields());
        assert_eq!(
            result.rows,
            vec![vec![Value::Int64(3)], vec![Value::Int64(1)], vec![Value::Int64(2)]]
        );
        assert_eq!(result.rows_affected, 3);
        assert_eq!(result.insert_id, 7);
        assert_eq!(sc.metrics().snapshot().shard_queries, 2);
    }

    #[tokio::test]
    async fn test_execute_fails_on_any_shard_error() {
        let mut conn = MapConn::default();
        conn.results.insert("-80".into(), rows(&[1], 0));
        conn.results.insert("80-".into(), Err(ShardError::fatal("error: err")));
        let sc = scatter(conn);

        let err = sc.execute(&requests(&["-80", "80-"])).await.unwrap_err();
        assert_eq!(err.to_string(), "target: ks.80-: error: err");
        assert_eq!(sc.metrics().snapshot().shard_failures, 1);
    }

    #[tokio::test]
    async fn test_execute_rejects_mismatched_fields() {
        let mut conn = MapConn::default();
        conn.results.insert("-80".into(), rows(&[1], 0));
        conn.results.insert(
            "80-".into(),
            Ok(QueryResult::with_fields(vec![Field::new("name", FieldType::VarChar)])),
        );
        let err = scatter(conn).execute(&requests(&["-80", "80-"])).await.unwrap_err();
        assert!(matches!(err, ScatterError::FieldMismatch { .. }));
    }

    #[tokio::test]
    async fn test_execute_fans_out_concurrently() {
        let conn = MapConn {
            delay_ms: 100,
            ..MapConn::default()
        };
        let sc = scatter(conn);
        let start = std::time::Instant::now();
        sc.execute(&requests(&["-40", "40-80", "80-c0", "c0-"])).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_stream_sends_fields_once() {
        let mut conn = MapConn::default();
        conn.results.insert("-80".into(), rows(&[1, 2], 0));
        conn.results.insert("80-".into(), rows(&[3], 0));
        let sc = scatter(conn);
        let (tx, mut rx) = mpsc::channel(64);
        sc.stream_execute(&requests(&["-80", "80-"]), &tx).await.unwrap();
        drop(tx);

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks.iter().filter(|c| !c.fields.is_empty()).count(), 1);
        assert_eq!(chunks[0].fields, id_fields());
        let mut ids: Vec<Value> = chunks.iter().flat_map(|c| c.rows.concat()).collect();
        ids.sort_by_key(|v| v.to_u64());
        assert_eq!(ids, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
        for chunk in &chunks {
            assert_eq!(chunk.rows_affected, chunk.rows.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_stream_fields_lead_with_slow_sink() {
        let shards = ["-20", "20-40", "40-60", "60-80", "80-a0", "a0-c0", "c0-e0", "e0-"];
        let mut conn = MapConn::default();
        for (i, shard) in shards.iter().enumerate() {
            conn.results.insert(shard.to_string(), rows(&[i as i64, 10 + i as i64], 0));
        }
        let sc = scatter(conn);
        let (tx, mut rx) = mpsc::channel::<QueryResult>(1);
        let collect = async move {
            let mut chunks = Vec::new();
            while let Some(chunk) = rx.recv().await {
                tokio::task::yield_now().await;
                chunks.push(chunk);
            }
            chunks
        };
        let reqs = requests(&shards);
        let stream = async move { sc.stream_execute(&reqs, &tx).await };
        let (streamed, chunks) = tokio::join!(stream, collect);
        streamed.unwrap();

        assert_eq!(chunks[0].fields, id_fields());
        assert_eq!(chunks.iter().filter(|c| !c.fields.is_empty()).count(), 1);
        assert_eq!(chunks.iter().map(|c| c.rows.len()).sum::<usize>(), 16);
    }

    #[tokio::test]
    async fn test_stream_reports_closed_sink() {
        let mut conn = MapConn::default();
        conn.results.insert("0".into(), rows(&[1], 0));
        let sc = scatter(conn);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = sc.stream_execute(&requests(&["0"]), &tx).await.unwrap_err();
        assert!(matches!(err, ScatterError::SinkClosed));
    }
}
