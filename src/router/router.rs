//! The query router
//!
//! Parses a statement, plans it against the current VSchema snapshot and
//! executes the plan through the scatter connection. Lookup vindexes
//! issue their backing queries back through the same router.

use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use super::context::QueryContext;
use super::errors::{RouterError, RouterResult};
use crate::observability::{log_event, Event, MetricsSnapshot, RouterMetrics};
use crate::planner::{build_plan, Plan};
use crate::scatter::ScatterConn;
use crate::sql::{self, Statement};
use crate::sqltypes::{BindVars, BoundQuery, QueryResult};
use crate::topology::Topology;
use crate::vindex::VCursor;
use crate::vschema::VSchema;

pub struct Router {
    vschema: RwLock<Arc<VSchema>>,
    pub(super) topo: Arc<dyn Topology>,
    pub(super) scatter: ScatterConn,
    pub(super) metrics: Arc<RouterMetrics>,
}

impl Router {
    pub fn new(vschema: VSchema, topo: Arc<dyn Topology>, scatter: ScatterConn) -> Self {
        let metrics = Arc::clone(scatter.metrics());
        Self {
            vschema: RwLock::new(Arc::new(vschema)),
            topo,
            scatter,
            metrics,
        }
    }

    /// Current VSchema snapshot
    pub fn vschema(&self) -> Arc<VSchema> {
        let guard = self.vschema.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in a new VSchema. Requests already planned keep the snapshot
    /// they started with.
    pub fn update_vschema(&self, vschema: VSchema) {
        let keyspaces = vschema.keyspaces().count().to_string();
        {
            let mut guard = self.vschema.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::new(vschema);
        }
        log_event(Event::VSchemaUpdated, &[("keyspaces", &keyspaces)]);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Plans `sql` without executing it
    pub fn plan(&self, sql: &str) -> RouterResult<Plan> {
        let stmt = sql::parse(sql)?;
        self.plan_statement(&self.vschema(), sql, &stmt)
    }

    /// Executes `sql` and returns the merged result
    pub async fn execute(
        &self,
        ctx: &QueryContext,
        sql: &str,
        bind_vars: &BindVars,
    ) -> RouterResult<QueryResult> {
        let ctx = ctx.with_vschema(self.vschema());
        ctx.guard(self.execute_statement(&ctx, sql, bind_vars)).await
    }

    /// Executes a select and forwards results to `sink` as they arrive.
    ///
    /// Only the first chunk carries fields.
    pub async fn stream_execute(
        &self,
        ctx: &QueryContext,
        sql: &str,
        bind_vars: &BindVars,
        sink: mpsc::Sender<QueryResult>,
    ) -> RouterResult<()> {
        let stmt = sql::parse(sql)?;
        if !stmt.is_select() {
            return Err(RouterError::NotStreamable(sql.to_string()));
        }
        let vschema = self.vschema();
        let ctx = ctx.with_vschema(Arc::clone(&vschema));
        ctx.guard(async {
            let plan = self.plan_statement(&vschema, sql, &stmt)?;
            self.stream_plan(&ctx, &plan, bind_vars, &sink).await
        })
        .await
    }

    /// Plans against the snapshot pinned in `ctx`, so lookups issued
    /// mid-request route the same way as the statement that issued them
    pub(super) fn execute_statement<'a>(
        &'a self,
        ctx: &'a QueryContext,
        sql: &'a str,
        bind_vars: &'a BindVars,
    ) -> BoxFuture<'a, RouterResult<QueryResult>> {
        Box::pin(async move {
            let stmt = sql::parse(sql)?;
            let vschema = match ctx.vschema() {
                Some(vschema) => Arc::clone(vschema),
                None => self.vschema(),
            };
            let plan = self.plan_statement(&vschema, sql, &stmt)?;
            self.execute_plan(ctx, &plan, bind_vars).await
        })
    }

    fn plan_statement(&self, vschema: &VSchema, sql: &str, stmt: &Statement) -> RouterResult<Plan> {
        match build_plan(vschema, sql, stmt) {
            Ok(plan) => {
                let kind = plan
                    .opcode()
                    .map(|op| op.as_str())
                    .unwrap_or("Join");
                log_event(
                    Event::QueryPlanned,
                    &[("plan", kind), ("routes", &plan.route_count().to_string())],
                );
                Ok(plan)
            }
            Err(err) => {
                self.metrics.increment_rejected();
                log_event(
                    Event::QueryRejected,
                    &[("code", err.code().code()), ("error", err.message())],
                );
                Err(err.into())
            }
        }
    }
}

/// Routes lookup vindex queries through the router within the request
/// that triggered them
pub(crate) struct RequestCursor<'a> {
    router: &'a Router,
    ctx: &'a QueryContext,
}

impl<'a> RequestCursor<'a> {
    pub(crate) fn new(router: &'a Router, ctx: &'a QueryContext) -> Self {
        Self { router, ctx }
    }
}

impl VCursor for RequestCursor<'_> {
    fn execute_lookup<'a>(&'a self, query: BoundQuery) -> BoxFuture<'a, RouterResult<QueryResult>> {
        Box::pin(async move {
            self.router.metrics.increment_lookups();
            log_event(
                Event::LookupIssued,
                &[
                    ("request_id", &self.ctx.request_id().to_string()),
                    ("sql", &query.sql),
                ],
            );
            self.router
                .execute_statement(self.ctx, &query.sql, &query.bind_vars)
                .await
        })
    }
}
