//! Picks the vindex predicate a route is keyed on

use std::sync::Arc;

use super::errors::{PlanError, PlanResult};
use super::plan::{RouteOpcode, RouteValue};
use crate::sql::{ColName, ComparisonOp, Expr, Literal};
use crate::sqltypes::Value;
use crate::vindex::Vindex;
use crate::vschema::Table;

/// Bind variable carrying the per-shard subset of an IN list
pub const LIST_VAR: &str = "__vals";

/// Shard selection for one route
#[derive(Debug, Clone)]
pub(super) struct Routing {
    pub opcode: RouteOpcode,
    pub vindex: Option<Arc<dyn Vindex>>,
    pub values: Vec<RouteValue>,
    /// Filter conjunct the routing came from, and its column
    pub source: Option<(usize, ColName)>,
}

impl Routing {
    pub fn new(opcode: RouteOpcode) -> Self {
        Self {
            opcode,
            vindex: None,
            values: Vec::new(),
            source: None,
        }
    }

    fn cost(&self) -> (u8, u32) {
        (
            self.opcode.rank(),
            self.vindex.as_ref().map_or(u32::MAX, |v| v.cost()),
        )
    }
}

/// Converts a literal or bind variable into a routing value
pub(super) fn route_value(expr: &Expr) -> Option<RouteValue> {
    match expr {
        Expr::Literal(Literal::Integer(s)) => integer_value(s).map(RouteValue::Literal),
        Expr::Literal(Literal::String(s)) => Some(RouteValue::Literal(Value::Text(s.clone()))),
        Expr::Neg(inner) => match inner.as_ref() {
            Expr::Literal(Literal::Integer(s)) => format!("-{}", s)
                .parse::<i64>()
                .ok()
                .map(|v| RouteValue::Literal(Value::Int64(v))),
            _ => None,
        },
        Expr::BindVar(name) => Some(RouteValue::BindVar(name.clone())),
        _ => None,
    }
}

fn integer_value(s: &str) -> Option<Value> {
    s.parse::<i64>()
        .map(Value::Int64)
        .or_else(|_| s.parse::<u64>().map(Value::Uint64))
        .ok()
}

fn owns(col: &ColName, alias: &str, table: &Table) -> bool {
    col.qualifier.as_deref().map_or(true, |q| q == alias)
        && !table.vindexes_for_column(&col.name).is_empty()
}

/// Recognises `col = value`, `value = col`, `col in (values)` and
/// `col in ::list` on a vindex column of `table`.
pub(super) fn vindex_comparison(
    expr: &Expr,
    alias: &str,
    table: &Table,
) -> PlanResult<Option<(ColName, RouteOpcode, Vec<RouteValue>)>> {
    let Expr::Comparison { left, op, right } = expr else {
        return Ok(None);
    };
    match op {
        ComparisonOp::Eq => {
            let (col, other) = match (left.as_ref(), right.as_ref()) {
                (Expr::Column(c), other) if owns(c, alias, table) => (c, other),
                (other, Expr::Column(c)) if owns(c, alias, table) => (c, other),
                _ => return Ok(None),
            };
            if matches!(other, Expr::Subquery(_)) {
                return Err(PlanError::unsupported(format!(
                    "subquery as value for vindex column {}",
                    col
                )));
            }
            Ok(route_value(other).map(|v| (col.clone(), RouteOpcode::SelectEqual, vec![v])))
        }
        ComparisonOp::In => {
            let Expr::Column(col) = left.as_ref() else {
                return Ok(None);
            };
            if !owns(col, alias, table) {
                return Ok(None);
            }
            match right.as_ref() {
                Expr::Tuple(items) => Ok(items
                    .iter()
                    .map(route_value)
                    .collect::<Option<Vec<_>>>()
                    .map(|values| (col.clone(), RouteOpcode::SelectIN, values))),
                Expr::ListArg(name) => Ok(Some((
                    col.clone(),
                    RouteOpcode::SelectIN,
                    vec![RouteValue::ListArg(name.clone())],
                ))),
                Expr::Subquery(_) => Err(PlanError::unsupported(format!(
                    "subquery as value for vindex column {}",
                    col
                ))),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// Chooses the cheapest routing among `filters`: equality beats IN beats
/// scatter, then lower vindex cost wins.
pub(super) fn choose_routing(alias: &str, table: &Table, filters: &[Expr]) -> PlanResult<Routing> {
    let mut best = Routing::new(RouteOpcode::SelectScatter);
    for (i, filter) in filters.iter().enumerate() {
        let Some((col, opcode, values)) = vindex_comparison(filter, alias, table)? else {
            continue;
        };
        for cv in table.vindexes_for_column(&col.name) {
            let candidate = Routing {
                opcode,
                vindex: Some(Arc::clone(&cv.vindex)),
                values: values.clone(),
                source: Some((i, col.clone())),
            };
            if candidate.cost() < best.cost() {
                best = candidate;
            }
        }
    }
    Ok(best)
}

/// Replaces the IN list the routing came from with `::__vals`
pub(super) fn rewrite_in_list(filters: &mut [Expr], routing: &Routing) {
    if routing.opcode != RouteOpcode::SelectIN {
        return;
    }
    if let Some((i, col)) = &routing.source {
        filters[*i] = Expr::comparison(
            Expr::Column(col.clone()),
            ComparisonOp::In,
            Expr::ListArg(LIST_VAR.to_string()),
        );
    }
}
