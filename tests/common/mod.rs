//! Shared sandbox for router integration tests
//!
//! - `SandboxConn`: records every shard query and replays queued results
//! - `SandboxTopology`: mutable shard layouts with injectable failures
//! - `router_env()`: a router over both, wired like production

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use shardgate::router::{QueryContext, Router, RouterResult};
use shardgate::scatter::{RetryPolicy, ScatterConn, ShardConn, ShardError, ShardResult, Target};
use shardgate::sqltypes::{BindVars, BoundQuery, Field, FieldType, QueryResult, Value};
use shardgate::topology::{
    KeyRange, ShardReference, SrvKeyspace, TopoError, TopoResult, Topology,
};
use shardgate::vindex::hash_u64;
use shardgate::vschema::{VSchema, VSchemaSource};

pub const KS_ROUTER: &str = "TestRouter";
pub const KS_UNSHARDED: &str = "TestUnsharded";
pub const KS_BAD_SHARDING: &str = "TestBadSharding";

pub const SHARDS: [&str; 8] = ["-20", "20-40", "40-60", "60-80", "80-a0", "a0-c0", "c0-e0", "e0-"];

pub const ROUTER_VSCHEMA: &str = r#"{
    "keyspaces": {
        "TestRouter": {
            "sharded": true,
            "vindexes": {
                "user_index": {"type": "hash"},
                "music_user_map": {
                    "type": "lookup_hash_unique",
                    "params": {"table": "music_user_map", "from": "music_id", "to": "user_id"},
                    "owner": "music"
                },
                "name_user_map": {
                    "type": "lookup_hash",
                    "params": {"table": "name_user_map", "from": "name", "to": "user_id"},
                    "owner": "user"
                }
            },
            "tables": {
                "user": {"column_vindexes": [
                    {"column": "id", "name": "user_index"},
                    {"column": "name", "name": "name_user_map"}
                ]},
                "user_extra": {"column_vindexes": [
                    {"column": "user_id", "name": "user_index"}
                ]},
                "music": {"column_vindexes": [
                    {"column": "id", "name": "music_user_map"}
                ]}
            }
        },
        "TestUnsharded": {
            "tables": {
                "music_user_map": {},
                "name_user_map": {},
                "main1": {}
            }
        },
        "TestBadSharding": {
            "tables": {"sharded_table": {}}
        }
    }
}"#;

// =============================================================================
// Shard connection
// =============================================================================

#[derive(Default)]
struct SandboxShard {
    queries: Vec<BoundQuery>,
    exec_count: usize,
    results: VecDeque<QueryResult>,
    fail_next: usize,
    error: Option<ShardError>,
    delay: Option<Duration>,
}

/// Answers every shard with queued results, then with
/// [`single_row_result`]
#[derive(Default)]
pub struct SandboxConn {
    shards: Mutex<BTreeMap<String, SandboxShard>>,
}

impl SandboxConn {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_shard<T>(&self, keyspace: &str, shard: &str, f: impl FnOnce(&mut SandboxShard) -> T) -> T {
        let mut shards = self.shards.lock().unwrap();
        f(shards.entry(format!("{}.{}", keyspace, shard)).or_default())
    }

    /// Results returned by the next calls, in order
    pub fn set_results(&self, keyspace: &str, shard: &str, results: Vec<QueryResult>) {
        self.with_shard(keyspace, shard, |s| s.results = results.into());
    }

    /// Fails the next `count` calls with `error`
    pub fn fail_next(&self, keyspace: &str, shard: &str, count: usize, error: ShardError) {
        self.with_shard(keyspace, shard, |s| {
            s.fail_next = count;
            s.error = Some(error);
        });
    }

    /// Fails the next call with a fatal `error: err`
    pub fn must_fail(&self, keyspace: &str, shard: &str) {
        self.fail_next(keyspace, shard, 1, ShardError::fatal("error: err"));
    }

    pub fn set_delay(&self, keyspace: &str, shard: &str, delay: Duration) {
        self.with_shard(keyspace, shard, |s| s.delay = Some(delay));
    }

    /// Queries that reached the shard, failed attempts excluded
    pub fn queries(&self, keyspace: &str, shard: &str) -> Vec<BoundQuery> {
        self.with_shard(keyspace, shard, |s| s.queries.clone())
    }

    /// Attempts made against the shard, failed ones included
    pub fn exec_count(&self, keyspace: &str, shard: &str) -> usize {
        self.with_shard(keyspace, shard, |s| s.exec_count)
    }

    /// Every shard that received at least one query
    pub fn shards_queried(&self) -> Vec<String> {
        let shards = self.shards.lock().unwrap();
        shards
            .iter()
            .filter(|(_, s)| !s.queries.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn clear_queries(&self) {
        let mut shards = self.shards.lock().unwrap();
        for shard in shards.values_mut() {
            shard.queries.clear();
            shard.exec_count = 0;
        }
    }

    fn next(&self, target: &Target, query: &BoundQuery) -> (Option<Duration>, ShardResult<QueryResult>) {
        self.with_shard(&target.keyspace, &target.shard, |s| {
            s.exec_count += 1;
            if s.fail_next > 0 {
                s.fail_next -= 1;
                let error = s.error.clone().unwrap_or_else(|| ShardError::fatal("error: err"));
                return (s.delay, Err(error));
            }
            s.queries.push(query.clone());
            let result = s.results.pop_front().unwrap_or_else(single_row_result);
            (s.delay, Ok(result))
        })
    }
}

impl ShardConn for SandboxConn {
    fn execute<'a>(
        &'a self,
        target: &'a Target,
        query: &'a BoundQuery,
    ) -> BoxFuture<'a, ShardResult<QueryResult>> {
        let (delay, result) = self.next(target, query);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn stream_execute<'a>(
        &'a self,
        target: &'a Target,
        query: &'a BoundQuery,
        sink: mpsc::Sender<QueryResult>,
    ) -> BoxFuture<'a, ShardResult<()>> {
        let (delay, result) = self.next(target, query);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            sink.send(result?)
                .await
                .map_err(|_| ShardError::fatal("stream receiver closed"))
        })
    }
}

// =============================================================================
// Topology
// =============================================================================

/// Shard layouts per keyspace; `fail_next` makes lookups fail with
/// `topo error GetSrvKeyspace`
#[derive(Default)]
pub struct SandboxTopology {
    keyspaces: Mutex<BTreeMap<String, Vec<String>>>,
    failures: Mutex<BTreeMap<String, usize>>,
}

impl SandboxTopology {
    pub fn set_shards(&self, keyspace: &str, shards: &[&str]) {
        self.keyspaces.lock().unwrap().insert(
            keyspace.to_string(),
            shards.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn fail_next(&self, keyspace: &str, count: usize) {
        self.failures.lock().unwrap().insert(keyspace.to_string(), count);
    }

    fn lookup(&self, keyspace: &str) -> TopoResult<Arc<SrvKeyspace>> {
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(count) = failures.get_mut(keyspace) {
                if *count > 0 {
                    *count -= 1;
                    return Err(TopoError::Unavailable("GetSrvKeyspace".into()));
                }
            }
        }
        let keyspaces = self.keyspaces.lock().unwrap();
        let shards = keyspaces
            .get(keyspace)
            .ok_or_else(|| TopoError::KeyspaceNotFound(keyspace.to_string()))?;
        Ok(Arc::new(SrvKeyspace {
            name: keyspace.to_string(),
            shards: shards
                .iter()
                .map(|s| ShardReference::parse(s))
                .collect::<TopoResult<Vec<_>>>()?,
        }))
    }
}

impl Topology for SandboxTopology {
    fn srv_keyspace<'a>(&'a self, keyspace: &'a str) -> BoxFuture<'a, TopoResult<Arc<SrvKeyspace>>> {
        let result = self.lookup(keyspace);
        Box::pin(async move { result })
    }
}

// =============================================================================
// Router environment
// =============================================================================

pub struct RouterEnv {
    pub router: Router,
    pub conn: Arc<SandboxConn>,
    pub topo: Arc<SandboxTopology>,
}

impl RouterEnv {
    pub async fn exec(&self, sql: &str, bind_vars: BindVars) -> RouterResult<QueryResult> {
        self.router
            .execute(&QueryContext::background(), sql, &bind_vars)
            .await
    }

    /// Streams `sql` and folds the chunks into one result
    pub async fn stream(&self, sql: &str) -> RouterResult<QueryResult> {
        let ctx = QueryContext::background();
        let bind_vars = BindVars::new();
        let (tx, mut rx) = mpsc::channel::<QueryResult>(4);
        let collect = async move {
            let mut result = QueryResult::default();
            while let Some(chunk) = rx.recv().await {
                if result.fields.is_empty() {
                    result.fields = chunk.fields;
                } else {
                    assert!(chunk.fields.is_empty(), "fields sent twice");
                }
                result.rows_affected += chunk.rows_affected;
                result.rows.extend(chunk.rows);
            }
            result
        };
        let (streamed, result) = tokio::join!(
            self.router.stream_execute(&ctx, sql, &bind_vars, tx),
            collect
        );
        streamed.map(|_| result)
    }

    pub fn queries(&self, keyspace: &str, shard: &str) -> Vec<BoundQuery> {
        self.conn.queries(keyspace, shard)
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        ..RetryPolicy::default()
    }
}

pub fn test_vschema() -> VSchema {
    let source: VSchemaSource = serde_json::from_str(ROUTER_VSCHEMA).unwrap();
    VSchema::build(&source).unwrap()
}

pub fn router_env() -> RouterEnv {
    router_env_with_policy(retry_policy())
}

pub fn router_env_with_policy(policy: RetryPolicy) -> RouterEnv {
    let conn = Arc::new(SandboxConn::new());
    let topo = Arc::new(SandboxTopology::default());
    topo.set_shards(KS_ROUTER, &SHARDS);
    topo.set_shards(KS_UNSHARDED, &["0"]);
    topo.set_shards(KS_BAD_SHARDING, &["-80", "80-"]);

    let scatter = ScatterConn::new(Arc::clone(&conn) as Arc<dyn ShardConn>, policy);
    let router = Router::new(test_vschema(), Arc::clone(&topo) as Arc<dyn Topology>, scatter);
    RouterEnv { router, conn, topo }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Default answer of every sandbox shard
pub fn single_row_result() -> QueryResult {
    QueryResult {
        fields: vec![
            Field::new("id", FieldType::Int32),
            Field::new("value", FieldType::VarChar),
        ],
        rows: vec![vec![Value::Int64(1), Value::from("foo")]],
        rows_affected: 1,
        insert_id: 0,
    }
}

pub fn fields(specs: &[(&str, FieldType)]) -> Vec<Field> {
    specs.iter().map(|(name, t)| Field::new(*name, *t)).collect()
}

pub fn fields_only(specs: &[(&str, FieldType)]) -> QueryResult {
    QueryResult::with_fields(fields(specs))
}

pub fn query(sql: &str, bind_vars: BindVars) -> BoundQuery {
    BoundQuery::new(sql, bind_vars)
}

/// Shard of `TestRouter` the hash vindex sends `id` to
pub fn shard_for(id: u64) -> &'static str {
    let ksid = hash_u64(id);
    SHARDS
        .iter()
        .copied()
        .find(|s| KeyRange::parse(s).unwrap().contains(&ksid))
        .unwrap()
}
