//! Explain output for routed statements
//!
//! Produces deterministic output for accepted and rejected statements.

use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::errors::PlanError;
use super::plan::Plan;

#[derive(Debug, Clone, Serialize)]
pub struct ExplainPlan {
    pub accepted: bool,
    /// Number of routes (absent if rejected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            accepted: true,
            routes: Some(plan.route_count()),
            plan: Some(plan.explain()),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    pub fn from_error(err: &PlanError) -> Self {
        Self {
            accepted: false,
            routes: None,
            plan: None,
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(err.message().to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            if let Some(routes) = self.routes {
                writeln!(f, "Routes: {}", routes)?;
            }
            if let Some(plan) = &self.plan {
                write_node(f, plan, 0)?;
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &JsonValue, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match node["kind"].as_str() {
        Some("join") => {
            let kind = if node["is_left"].as_bool() == Some(true) {
                "LeftJoin"
            } else {
                "Join"
            };
            writeln!(f, "{}{} vars={} cols={}", indent, kind, node["vars"], node["cols"])?;
            write_node(f, &node["left"], depth + 1)?;
            write_node(f, &node["right"], depth + 1)
        }
        _ => {
            writeln!(
                f,
                "{}Route {} {}: {}",
                indent,
                node["opcode"].as_str().unwrap_or("?"),
                node["keyspace"].as_str().unwrap_or("?"),
                node["query"].as_str().unwrap_or("")
            )?;
            if let Some(vindex) = node["vindex"].as_str() {
                writeln!(f, "{}  vindex {} values {}", indent, vindex, node["values"])?;
            }
            Ok(())
        }
    }
}
