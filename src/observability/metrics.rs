//! Router counters
//!
//! - Counters only, monotonic
//! - Reset only when the router is created
//! - Relaxed atomics; snapshots are not a consistent cut

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::planner::RouteOpcode;

#[derive(Debug, Default)]
pub struct RouterMetrics {
    unsharded: AtomicU64,
    select_equal: AtomicU64,
    select_in: AtomicU64,
    select_scatter: AtomicU64,
    dml_equal: AtomicU64,
    joins: AtomicU64,
    shard_queries: AtomicU64,
    shard_retries: AtomicU64,
    shard_failures: AtomicU64,
    lookups: AtomicU64,
    field_probes: AtomicU64,
    queries_rejected: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_route(&self, opcode: RouteOpcode) {
        let counter = match opcode {
            RouteOpcode::Unsharded => &self.unsharded,
            RouteOpcode::SelectEqual => &self.select_equal,
            RouteOpcode::SelectIN => &self.select_in,
            RouteOpcode::SelectScatter => &self.select_scatter,
            RouteOpcode::UpdateEqual | RouteOpcode::DeleteEqual | RouteOpcode::InsertSharded => {
                &self.dml_equal
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_joins(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_shard_queries(&self, count: u64) {
        self.shard_queries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.shard_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failures(&self) {
        self.shard_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lookups(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_field_probes(&self) {
        self.field_probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            unsharded: self.unsharded.load(Ordering::Relaxed),
            select_equal: self.select_equal.load(Ordering::Relaxed),
            select_in: self.select_in.load(Ordering::Relaxed),
            select_scatter: self.select_scatter.load(Ordering::Relaxed),
            dml_equal: self.dml_equal.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            shard_queries: self.shard_queries.load(Ordering::Relaxed),
            shard_retries: self.shard_retries.load(Ordering::Relaxed),
            shard_failures: self.shard_failures.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            field_probes: self.field_probes.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub unsharded: u64,
    pub select_equal: u64,
    pub select_in: u64,
    pub select_scatter: u64,
    pub dml_equal: u64,
    pub joins: u64,
    pub shard_queries: u64,
    pub shard_retries: u64,
    pub shard_failures: u64,
    pub lookups: u64,
    pub field_probes: u64,
    pub queries_rejected: u64,
}
