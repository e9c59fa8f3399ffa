//! Plan execution: routes, nested-loop joins and field probes
//!
//! Plans are trees, so every entry point here returns a boxed future and
//! recurses through the same functions for both sides of a join.

use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use super::context::QueryContext;
use super::errors::{RouterError, RouterResult};
use super::router::Router;
use crate::observability::{log_event, Event};
use crate::planner::{Join, JoinColumn, Plan, Route};
use crate::scatter::{ScatterError, Target};
use crate::sqltypes::{BindVars, BoundQuery, Field, QueryResult, Row, Value};
use crate::topology::any_shard;

const STREAM_BUFFER: usize = 16;

impl Router {
    pub(super) fn execute_plan<'a>(
        &'a self,
        ctx: &'a QueryContext,
        plan: &'a Plan,
        bind_vars: &'a BindVars,
    ) -> BoxFuture<'a, RouterResult<QueryResult>> {
        Box::pin(async move {
            match plan {
                Plan::Route(route) => self.execute_route(ctx, route, bind_vars).await,
                Plan::Join(join) => self.execute_join(ctx, join, bind_vars).await,
            }
        })
    }

    async fn execute_route(
        &self,
        ctx: &QueryContext,
        route: &Route,
        bind_vars: &BindVars,
    ) -> RouterResult<QueryResult> {
        let requests = self.route_queries(ctx, route, bind_vars).await?;
        self.metrics.record_route(route.opcode);
        if requests.is_empty() {
            return Ok(QueryResult::empty());
        }
        Ok(self.scatter.execute(&requests).await?)
    }

    async fn execute_join(
        &self,
        ctx: &QueryContext,
        join: &Join,
        bind_vars: &BindVars,
    ) -> RouterResult<QueryResult> {
        self.metrics.increment_joins();
        let left = self.execute_plan(ctx, &join.left, bind_vars).await?;
        let left_fields = if left.fields.is_empty() {
            self.get_fields(ctx, &join.left, bind_vars).await?
        } else {
            left.fields
        };

        let mut rows = Vec::new();
        let mut right_fields = None;
        for lrow in &left.rows {
            let vars = bind_join_vars(bind_vars, &join.vars, Some(lrow));
            let right = self.execute_plan(ctx, &join.right, &vars).await?;
            if right_fields.is_none() && !right.fields.is_empty() {
                right_fields = Some(right.fields);
            }
            if right.rows.is_empty() {
                if join.is_left {
                    rows.push(join_row(lrow, &[], &join.cols));
                }
                continue;
            }
            rows.extend(right.rows.iter().map(|rrow| join_row(lrow, rrow, &join.cols)));
        }

        // no right execution reported fields, including the zero-row case
        let right_fields = match right_fields {
            Some(fields) => fields,
            None => {
                let vars = bind_join_vars(bind_vars, &join.vars, None);
                self.get_fields(ctx, &join.right, &vars).await?
            }
        };

        Ok(QueryResult {
            fields: join_fields(&left_fields, &right_fields, &join.cols),
            rows_affected: rows.len() as u64,
            rows,
            insert_id: 0,
        })
    }

    /// Result fields of `plan`, learned from zero-row probe queries
    pub(super) fn get_fields<'a>(
        &'a self,
        ctx: &'a QueryContext,
        plan: &'a Plan,
        bind_vars: &'a BindVars,
    ) -> BoxFuture<'a, RouterResult<Vec<Field>>> {
        Box::pin(async move {
            match plan {
                Plan::Route(route) => self.probe_route(route, bind_vars).await,
                Plan::Join(join) => {
                    let left = self.get_fields(ctx, &join.left, bind_vars).await?;
                    let vars = bind_join_vars(bind_vars, &join.vars, None);
                    let right = self.get_fields(ctx, &join.right, &vars).await?;
                    Ok(join_fields(&left, &right, &join.cols))
                }
            }
        })
    }

    async fn probe_route(&self, route: &Route, bind_vars: &BindVars) -> RouterResult<Vec<Field>> {
        let stage = route.opcode.stage();
        let query = route.field_query.as_ref().ok_or_else(|| RouterError::Unroutable {
            stage,
            message: format!("no field query for {}", route.query),
        })?;
        let srv = self.srv_keyspace(stage, &route.keyspace).await?;
        let shard = any_shard(&srv).ok_or_else(|| RouterError::Unroutable {
            stage,
            message: format!("keyspace {} has no shards", route.keyspace),
        })?;

        self.metrics.increment_field_probes();
        log_event(
            Event::JoinFieldProbe,
            &[("keyspace", &route.keyspace), ("shard", &shard.name)],
        );
        let request = (
            Target::new(&route.keyspace, &shard.name),
            BoundQuery::new(query.clone(), bind_vars.clone()),
        );
        let result = self.scatter.execute(std::slice::from_ref(&request)).await?;
        Ok(result.fields)
    }

    pub(super) fn stream_plan<'a>(
        &'a self,
        ctx: &'a QueryContext,
        plan: &'a Plan,
        bind_vars: &'a BindVars,
        sink: &'a mpsc::Sender<QueryResult>,
    ) -> BoxFuture<'a, RouterResult<()>> {
        Box::pin(async move {
            match plan {
                Plan::Route(route) => {
                    let requests = self.route_queries(ctx, route, bind_vars).await?;
                    self.metrics.record_route(route.opcode);
                    if requests.is_empty() {
                        return Ok(());
                    }
                    Ok(self.scatter.stream_execute(&requests, sink).await?)
                }
                Plan::Join(join) => self.stream_join(ctx, join, bind_vars, sink).await,
            }
        })
    }

    /// Streams the left side and runs the right side once per left row as
    /// rows arrive. Joined chunks report no affected rows.
    async fn stream_join(
        &self,
        ctx: &QueryContext,
        join: &Join,
        bind_vars: &BindVars,
        sink: &mpsc::Sender<QueryResult>,
    ) -> RouterResult<()> {
        self.metrics.increment_joins();
        let (tx, mut rx) = mpsc::channel::<QueryResult>(STREAM_BUFFER);

        let produce = async move { self.stream_plan(ctx, &join.left, bind_vars, &tx).await };
        let consume = async move {
            let mut left_fields: Option<Vec<Field>> = None;
            let mut fields_sent = false;
            while let Some(chunk) = rx.recv().await {
                if left_fields.is_none() && !chunk.fields.is_empty() {
                    left_fields = Some(chunk.fields);
                }
                let lfields = left_fields.as_deref().unwrap_or(&[]);
                for lrow in &chunk.rows {
                    let vars = bind_join_vars(bind_vars, &join.vars, Some(lrow));
                    let matched = self
                        .stream_right(ctx, join, lfields, lrow, &vars, &mut fields_sent, sink)
                        .await?;
                    if matched || !join.is_left {
                        continue;
                    }
                    if !fields_sent {
                        let fields = self.join_fields_probe(ctx, join, bind_vars, lfields).await?;
                        send(sink, QueryResult::with_fields(fields)).await?;
                        fields_sent = true;
                    }
                    let out = QueryResult {
                        rows: vec![join_row(lrow, &[], &join.cols)],
                        ..QueryResult::default()
                    };
                    send(sink, out).await?;
                }
            }

            Ok::<_, RouterError>((left_fields, fields_sent))
        };

        // the consumer owns the receiver, so its failure unblocks the producer
        let (left, consumed) = tokio::join!(produce, consume);
        let (left_fields, fields_sent) = consumed?;
        left?;

        if !fields_sent {
            let lfields = match left_fields {
                Some(fields) => fields,
                None => self.get_fields(ctx, &join.left, bind_vars).await?,
            };
            let fields = self.join_fields_probe(ctx, join, bind_vars, &lfields).await?;
            send(sink, QueryResult::with_fields(fields)).await?;
        }
        Ok(())
    }

    /// Streams the right side for one left row. Returns whether any right
    /// row matched.
    #[allow(clippy::too_many_arguments)]
    async fn stream_right(
        &self,
        ctx: &QueryContext,
        join: &Join,
        left_fields: &[Field],
        lrow: &Row,
        vars: &BindVars,
        fields_sent: &mut bool,
        sink: &mpsc::Sender<QueryResult>,
    ) -> RouterResult<bool> {
        let (tx, mut rx) = mpsc::channel::<QueryResult>(STREAM_BUFFER);

        let produce = async move { self.stream_plan(ctx, &join.right, vars, &tx).await };
        let consume = async move {
            let mut matched = false;
            while let Some(chunk) = rx.recv().await {
                let mut out = QueryResult::default();
                if !*fields_sent && (!chunk.fields.is_empty() || !chunk.rows.is_empty()) {
                    let right_fields = if chunk.fields.is_empty() {
                        self.get_fields(ctx, &join.right, vars).await?
                    } else {
                        chunk.fields
                    };
                    out.fields = join_fields(left_fields, &right_fields, &join.cols);
                    *fields_sent = true;
                }
                matched |= !chunk.rows.is_empty();
                out.rows = chunk
                    .rows
                    .iter()
                    .map(|rrow| join_row(lrow, rrow, &join.cols))
                    .collect();
                if out.fields.is_empty() && out.rows.is_empty() {
                    continue;
                }
                send(sink, out).await?;
            }
            Ok::<_, RouterError>(matched)
        };

        let (right, matched) = tokio::join!(produce, consume);
        let matched = matched?;
        right?;
        Ok(matched)
    }

    async fn join_fields_probe(
        &self,
        ctx: &QueryContext,
        join: &Join,
        bind_vars: &BindVars,
        left_fields: &[Field],
    ) -> RouterResult<Vec<Field>> {
        let vars = bind_join_vars(bind_vars, &join.vars, None);
        let right = self.get_fields(ctx, &join.right, &vars).await?;
        Ok(join_fields(left_fields, &right, &join.cols))
    }
}

async fn send(sink: &mpsc::Sender<QueryResult>, chunk: QueryResult) -> RouterResult<()> {
    sink.send(chunk)
        .await
        .map_err(|_| RouterError::Scatter(ScatterError::SinkClosed))
}

/// Caller bind variables plus one variable per join column, taken from
/// `row` or set to NULL when probing
fn bind_join_vars(
    bind_vars: &BindVars,
    join_vars: &BTreeMap<String, usize>,
    row: Option<&Row>,
) -> BindVars {
    let mut vars = bind_vars.clone();
    for (name, col) in join_vars {
        let value = row
            .and_then(|row| row.get(*col))
            .cloned()
            .unwrap_or(Value::Null);
        vars.insert(name.clone(), value);
    }
    vars
}

fn join_fields(left: &[Field], right: &[Field], cols: &[JoinColumn]) -> Vec<Field> {
    cols.iter()
        .filter_map(|col| match col {
            JoinColumn::Left(i) => left.get(*i).cloned(),
            JoinColumn::Right(i) => right.get(*i).cloned(),
        })
        .collect()
}

/// Projects one output row; columns missing on either side become NULL
fn join_row(left: &[Value], right: &[Value], cols: &[JoinColumn]) -> Row {
    cols.iter()
        .map(|col| {
            let value = match col {
                JoinColumn::Left(i) => left.get(*i),
                JoinColumn::Right(i) => right.get(*i),
            };
            value.cloned().unwrap_or(Value::Null)
        })
        .collect()
}
