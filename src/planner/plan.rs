//! Immutable execution plans

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::sqltypes::Value;
use crate::vindex::Vindex;

/// How a route picks its shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteOpcode {
    /// Single shard of an unsharded keyspace, SQL sent verbatim
    Unsharded,
    /// Vindex column pinned to one value
    SelectEqual,
    /// Vindex column pinned to a list of values
    SelectIN,
    /// Every shard of the keyspace
    SelectScatter,
    UpdateEqual,
    DeleteEqual,
    InsertSharded,
}

impl RouteOpcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOpcode::Unsharded => "Unsharded",
            RouteOpcode::SelectEqual => "SelectEqual",
            RouteOpcode::SelectIN => "SelectIN",
            RouteOpcode::SelectScatter => "SelectScatter",
            RouteOpcode::UpdateEqual => "UpdateEqual",
            RouteOpcode::DeleteEqual => "DeleteEqual",
            RouteOpcode::InsertSharded => "InsertSharded",
        }
    }

    /// Prefix attached to errors raised while resolving this route
    pub fn stage(&self) -> &'static str {
        match self {
            RouteOpcode::Unsharded => "paramsUnsharded",
            RouteOpcode::SelectEqual => "paramsSelectEqual",
            RouteOpcode::SelectIN => "paramsSelectIN",
            RouteOpcode::SelectScatter => "paramsSelectScatter",
            RouteOpcode::UpdateEqual => "paramsUpdateEqual",
            RouteOpcode::DeleteEqual => "paramsDeleteEqual",
            RouteOpcode::InsertSharded => "paramsInsertSharded",
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(
            self,
            RouteOpcode::SelectEqual | RouteOpcode::SelectIN | RouteOpcode::SelectScatter
        )
    }

    /// Lower rank routes fewer shards
    pub(crate) fn rank(&self) -> u8 {
        match self {
            RouteOpcode::SelectEqual
            | RouteOpcode::UpdateEqual
            | RouteOpcode::DeleteEqual
            | RouteOpcode::InsertSharded => 0,
            RouteOpcode::SelectIN => 1,
            RouteOpcode::SelectScatter | RouteOpcode::Unsharded => 2,
        }
    }
}

impl fmt::Display for RouteOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value the route is keyed on, resolved against bind variables at
/// execution time
#[derive(Debug, Clone, PartialEq)]
pub enum RouteValue {
    Literal(Value),
    /// `:name`, including join variables
    BindVar(String),
    /// `::name`, expands to the items of a tuple bind variable
    ListArg(String),
}

impl fmt::Display for RouteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteValue::Literal(v) => write!(f, "{}", v),
            RouteValue::BindVar(name) => write!(f, ":{}", name),
            RouteValue::ListArg(name) => write!(f, "::{}", name),
        }
    }
}

/// A statement sent to one keyspace
#[derive(Debug, Clone)]
pub struct Route {
    pub opcode: RouteOpcode,
    pub keyspace: String,
    /// SQL sent to the target shards
    pub query: String,
    /// Zero-row variant used to learn the result fields
    pub field_query: Option<String>,
    pub vindex: Option<Arc<dyn Vindex>>,
    pub values: Vec<RouteValue>,
    /// Tables covered, for explain output
    pub tables: Vec<String>,
}

/// Which side of a join an output column comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinColumn {
    Left(usize),
    Right(usize),
}

impl fmt::Display for JoinColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinColumn::Left(i) => write!(f, "L{}", i),
            JoinColumn::Right(i) => write!(f, "R{}", i),
        }
    }
}

/// Nested-loop join across routes
#[derive(Debug, Clone)]
pub struct Join {
    pub left: Plan,
    pub right: Plan,
    pub is_left: bool,
    /// Bind variable name to the left result column supplying it
    pub vars: BTreeMap<String, usize>,
    /// Output projection
    pub cols: Vec<JoinColumn>,
}

#[derive(Debug, Clone)]
pub enum Plan {
    Route(Route),
    Join(Box<Join>),
}

impl Plan {
    /// Number of routes in the plan
    pub fn route_count(&self) -> usize {
        match self {
            Plan::Route(_) => 1,
            Plan::Join(join) => join.left.route_count() + join.right.route_count(),
        }
    }

    /// Opcode for single-route plans
    pub fn opcode(&self) -> Option<RouteOpcode> {
        match self {
            Plan::Route(route) => Some(route.opcode),
            Plan::Join(_) => None,
        }
    }

    /// JSON description of the plan tree
    pub fn explain(&self) -> JsonValue {
        match self {
            Plan::Route(route) => json!({
                "kind": "route",
                "opcode": route.opcode.as_str(),
                "keyspace": route.keyspace,
                "tables": route.tables,
                "query": route.query,
                "field_query": route.field_query,
                "vindex": route.vindex.as_ref().map(|v| v.name().to_string()),
                "values": route.values.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }),
            Plan::Join(join) => json!({
                "kind": "join",
                "is_left": join.is_left,
                "vars": join.vars,
                "cols": join.cols.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "left": join.left.explain(),
                "right": join.right.explain(),
            }),
        }
    }
}
