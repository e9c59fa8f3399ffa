//! Plans INSERT, UPDATE and DELETE
//!
//! Sharded DML is only routed when it is pinned to one shard by the
//! table's primary vindex. Lookup vindex rows are not maintained.

use std::sync::Arc;

use super::errors::{PlanError, PlanResult};
use super::plan::{Plan, Route, RouteOpcode, RouteValue};
use super::routing::{route_value, vindex_comparison};
use crate::sql::{split_and, Delete, Expr, Insert, Update};
use crate::vschema::{Table, VSchema};

pub(super) fn plan_insert(vschema: &VSchema, sql: &str, insert: &Insert) -> PlanResult<Plan> {
    let table = vschema.find_table(insert.table.qualifier.as_deref(), &insert.table.name)?;
    let query = if insert.table.qualifier.is_some() {
        let mut stmt = insert.clone();
        stmt.table.qualifier = None;
        stmt.to_string()
    } else {
        sql.to_string()
    };
    if !table.sharded {
        return Ok(unsharded(&table, query));
    }

    if insert.rows.len() != 1 {
        return Err(PlanError::unsupported(format!(
            "multi-row insert into sharded table {}",
            table.name
        )));
    }
    let row = &insert.rows[0];
    if row.iter().any(Expr::contains_subquery) {
        return Err(PlanError::unsupported("subquery in sharded insert"));
    }
    let primary = table
        .primary()
        .ok_or_else(|| PlanError::unsupported(format!("table {} has no primary vindex", table.name)))?;
    let value = insert
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(&primary.column))
        .and_then(|pos| row.get(pos))
        .ok_or_else(|| {
            PlanError::unsupported(format!(
                "insert into {} must supply primary vindex column {}",
                table.name, primary.column
            ))
        })?;
    let value = route_value(value).ok_or_else(|| {
        PlanError::unsupported(format!(
            "value for primary vindex column {} must be a literal or bind variable",
            primary.column
        ))
    })?;

    Ok(pinned(&table, RouteOpcode::InsertSharded, query, value))
}

pub(super) fn plan_update(vschema: &VSchema, sql: &str, update: &Update) -> PlanResult<Plan> {
    let table = vschema.find_table(update.table.qualifier.as_deref(), &update.table.name)?;
    let query = if update.table.qualifier.is_some() {
        let mut stmt = update.clone();
        stmt.table.qualifier = None;
        stmt.to_string()
    } else {
        sql.to_string()
    };
    if !table.sharded {
        return Ok(unsharded(&table, query));
    }

    for assignment in &update.assignments {
        if !table.vindexes_for_column(&assignment.column.name).is_empty() {
            return Err(PlanError::unsupported(format!(
                "DML cannot change vindex column {}",
                assignment.column
            )));
        }
        if assignment.value.contains_subquery() {
            return Err(PlanError::unsupported("subquery in sharded update"));
        }
    }
    let value = primary_value(&table, update.where_clause.as_ref(), "update")?;
    Ok(pinned(&table, RouteOpcode::UpdateEqual, query, value))
}

pub(super) fn plan_delete(vschema: &VSchema, sql: &str, delete: &Delete) -> PlanResult<Plan> {
    let table = vschema.find_table(delete.table.qualifier.as_deref(), &delete.table.name)?;
    let query = if delete.table.qualifier.is_some() {
        let mut stmt = delete.clone();
        stmt.table.qualifier = None;
        stmt.to_string()
    } else {
        sql.to_string()
    };
    if !table.sharded {
        return Ok(unsharded(&table, query));
    }

    let value = primary_value(&table, delete.where_clause.as_ref(), "delete")?;
    Ok(pinned(&table, RouteOpcode::DeleteEqual, query, value))
}

/// Finds `primary_column = value` among the WHERE conjuncts
fn primary_value(table: &Table, filter: Option<&Expr>, verb: &str) -> PlanResult<RouteValue> {
    let multi_shard = || PlanError::unsupported(format!("multi-shard {} on table {}", verb, table.name));
    let filter = filter.ok_or_else(multi_shard)?;
    if filter.contains_subquery() {
        return Err(PlanError::unsupported(format!("subquery in sharded {}", verb)));
    }
    let primary = table.primary().ok_or_else(multi_shard)?;

    for conjunct in split_and(filter.clone()) {
        if let Some((col, RouteOpcode::SelectEqual, mut values)) =
            vindex_comparison(&conjunct, &table.name, table)?
        {
            if col.name.eq_ignore_ascii_case(&primary.column) {
                if let Some(value) = values.pop() {
                    return Ok(value);
                }
            }
        }
    }
    Err(multi_shard())
}

fn unsharded(table: &Table, query: String) -> Plan {
    Plan::Route(Route {
        opcode: RouteOpcode::Unsharded,
        keyspace: table.keyspace.clone(),
        query,
        field_query: None,
        vindex: None,
        values: Vec::new(),
        tables: vec![table.name.clone()],
    })
}

fn pinned(table: &Table, opcode: RouteOpcode, query: String, value: RouteValue) -> Plan {
    Plan::Route(Route {
        opcode,
        keyspace: table.keyspace.clone(),
        query,
        field_query: None,
        vindex: table.primary().map(|cv| Arc::clone(&cv.vindex)),
        values: vec![value],
        tables: vec![table.name.clone()],
    })
}
