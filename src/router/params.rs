//! Shard targets and bind variables for each route opcode
//!
//! - `Unsharded`: the keyspace's only shard, SQL verbatim
//! - `SelectEqual` and the pinned DML opcodes: shards of the mapped value
//! - `SelectIN`: one query per shard, `__vals` holding that shard's values
//! - `SelectScatter`: every shard, identical query

use std::collections::HashSet;
use std::sync::Arc;

use super::errors::{RouterError, RouterResult};
use super::router::{RequestCursor, Router};
use super::context::QueryContext;
use crate::planner::{Route, RouteOpcode, RouteValue, LIST_VAR};
use crate::scatter::Target;
use crate::sqltypes::{BindVars, BoundQuery, Value};
use crate::topology::{shard_for_keyspace_id, KeyspaceId, SrvKeyspace};

impl Router {
    /// Builds the per-shard queries for `route`. An empty list means no
    /// shard can hold a matching row.
    pub(super) async fn route_queries(
        &self,
        ctx: &QueryContext,
        route: &Route,
        bind_vars: &BindVars,
    ) -> RouterResult<Vec<(Target, BoundQuery)>> {
        match route.opcode {
            RouteOpcode::Unsharded => self.params_unsharded(route, bind_vars).await,
            RouteOpcode::SelectScatter => self.params_scatter(route, bind_vars).await,
            RouteOpcode::SelectIN => self.params_select_in(ctx, route, bind_vars).await,
            RouteOpcode::SelectEqual
            | RouteOpcode::UpdateEqual
            | RouteOpcode::DeleteEqual
            | RouteOpcode::InsertSharded => self.params_equal(ctx, route, bind_vars).await,
        }
    }

    pub(super) async fn srv_keyspace(
        &self,
        stage: &'static str,
        keyspace: &str,
    ) -> RouterResult<Arc<SrvKeyspace>> {
        self.topo
            .srv_keyspace(keyspace)
            .await
            .map_err(|source| RouterError::Topology {
                stage,
                keyspace: keyspace.to_string(),
                source,
            })
    }

    async fn params_unsharded(
        &self,
        route: &Route,
        bind_vars: &BindVars,
    ) -> RouterResult<Vec<(Target, BoundQuery)>> {
        let stage = route.opcode.stage();
        let srv = self.srv_keyspace(stage, &route.keyspace).await?;
        match srv.shards.as_slice() {
            [shard] => Ok(vec![(
                Target::new(&route.keyspace, &shard.name),
                BoundQuery::new(route.query.clone(), bind_vars.clone()),
            )]),
            [] => Err(RouterError::Unroutable {
                stage,
                message: format!("keyspace {} has no shards", route.keyspace),
            }),
            _ => Err(RouterError::UnshardedMultipleShards(route.keyspace.clone())),
        }
    }

    async fn params_scatter(
        &self,
        route: &Route,
        bind_vars: &BindVars,
    ) -> RouterResult<Vec<(Target, BoundQuery)>> {
        let srv = self.srv_keyspace(route.opcode.stage(), &route.keyspace).await?;
        Ok(srv
            .shards
            .iter()
            .map(|shard| {
                (
                    Target::new(&route.keyspace, &shard.name),
                    BoundQuery::new(route.query.clone(), bind_vars.clone()),
                )
            })
            .collect())
    }

    async fn params_equal(
        &self,
        ctx: &QueryContext,
        route: &Route,
        bind_vars: &BindVars,
    ) -> RouterResult<Vec<(Target, BoundQuery)>> {
        let stage = route.opcode.stage();
        let value = match route.values.first() {
            Some(value) => resolve_value(stage, value, bind_vars)?,
            None => {
                return Err(RouterError::Unroutable {
                    stage,
                    message: "route has no vindex value".to_string(),
                })
            }
        };
        // `col = NULL` matches nothing
        if value.is_null() && route.opcode != RouteOpcode::InsertSharded {
            return Ok(Vec::new());
        }

        let ksids = self
            .map_values(ctx, route, std::slice::from_ref(&value))
            .await?
            .pop()
            .unwrap_or_default();
        let srv = self.srv_keyspace(stage, &route.keyspace).await?;
        if route.opcode == RouteOpcode::InsertSharded && ksids.len() != 1 {
            return Err(RouterError::Unroutable {
                stage,
                message: format!("could not map {} to a keyspace id", value),
            });
        }

        let mut hit = HashSet::new();
        for ksid in &ksids {
            hit.insert(shard_index(stage, &srv, ksid)?);
        }
        let mut indexes: Vec<usize> = hit.into_iter().collect();
        indexes.sort_unstable();

        Ok(indexes
            .into_iter()
            .map(|i| {
                (
                    Target::new(&route.keyspace, &srv.shards[i].name),
                    BoundQuery::new(route.query.clone(), bind_vars.clone()),
                )
            })
            .collect())
    }

    async fn params_select_in(
        &self,
        ctx: &QueryContext,
        route: &Route,
        bind_vars: &BindVars,
    ) -> RouterResult<Vec<(Target, BoundQuery)>> {
        let stage = route.opcode.stage();
        let values: Vec<Value> = resolve_list(stage, &route.values, bind_vars)?
            .into_iter()
            .filter(|v| !v.is_null())
            .collect();
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let ksids = self.map_values(ctx, route, &values).await?;
        let srv = self.srv_keyspace(stage, &route.keyspace).await?;

        let mut groups: Vec<Vec<Value>> = vec![Vec::new(); srv.shards.len()];
        for (value, ids) in values.iter().zip(ksids) {
            let mut placed = Vec::with_capacity(ids.len());
            for ksid in &ids {
                let i = shard_index(stage, &srv, ksid)?;
                if !placed.contains(&i) {
                    placed.push(i);
                    groups[i].push(value.clone());
                }
            }
        }

        Ok(groups
            .into_iter()
            .enumerate()
            .filter(|(_, group)| !group.is_empty())
            .map(|(i, group)| {
                let mut vars = bind_vars.clone();
                vars.insert(LIST_VAR.to_string(), Value::Tuple(group));
                (
                    Target::new(&route.keyspace, &srv.shards[i].name),
                    BoundQuery::new(route.query.clone(), vars),
                )
            })
            .collect())
    }

    /// Runs the route's vindex over `values`, issuing lookups through this
    /// router when the vindex needs them
    async fn map_values(
        &self,
        ctx: &QueryContext,
        route: &Route,
        values: &[Value],
    ) -> RouterResult<Vec<Vec<KeyspaceId>>> {
        let stage = route.opcode.stage();
        let vindex = route.vindex.as_ref().ok_or_else(|| RouterError::Unroutable {
            stage,
            message: format!("route on keyspace {} has no vindex", route.keyspace),
        })?;
        let cursor = RequestCursor::new(self, ctx);
        vindex
            .map(&cursor, values)
            .await
            .map_err(|source| RouterError::Vindex { stage, source })
    }
}

fn shard_index(stage: &'static str, srv: &SrvKeyspace, ksid: &KeyspaceId) -> RouterResult<usize> {
    let shard = shard_for_keyspace_id(srv, ksid)
        .map_err(|source| RouterError::Resolve { stage, source })?;
    Ok(srv
        .shards
        .iter()
        .position(|s| s.name == shard.name)
        .unwrap_or_default())
}

fn resolve_value(stage: &'static str, value: &RouteValue, bind_vars: &BindVars) -> RouterResult<Value> {
    match value {
        RouteValue::Literal(v) => Ok(v.clone()),
        RouteValue::BindVar(name) => {
            bind_vars
                .get(name)
                .cloned()
                .ok_or_else(|| RouterError::MissingBindVar {
                    stage,
                    name: name.clone(),
                })
        }
        RouteValue::ListArg(name) => Err(RouterError::InvalidBindVar {
            stage,
            message: format!("list bind var ::{} used as a single value", name),
        }),
    }
}

/// Flattens literals, scalar bind variables and list bind variables
fn resolve_list(
    stage: &'static str,
    values: &[RouteValue],
    bind_vars: &BindVars,
) -> RouterResult<Vec<Value>> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            RouteValue::ListArg(name) => {
                let list = bind_vars.get(name).ok_or_else(|| RouterError::MissingBindVar {
                    stage,
                    name: name.clone(),
                })?;
                let items = list.as_tuple().ok_or_else(|| RouterError::InvalidBindVar {
                    stage,
                    message: format!("bind var ::{} is {}, not a list", name, list.type_name()),
                })?;
                out.extend(items.iter().cloned());
            }
            other => out.push(resolve_value(stage, other, bind_vars)?),
        }
    }
    Ok(out)
}
