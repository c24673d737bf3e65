//! Reactive re-execution: successful results are published under
//! `cell_<id>` and cells that reference that key run again.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use crate::{
    error::{BridgeError, BridgeResult},
    project::Cell,
};

pub mod graph;

pub use graph::DependencyGraph;

pub fn result_key(cell_id: i64) -> String {
    format!("cell_{cell_id}")
}

/// Reject a project whose cells reference each other in a cycle.
pub fn check_acyclic(cells: &[Cell]) -> BridgeResult<()> {
    match DependencyGraph::from_cells(cells).find_cycle() {
        Some(cycle) => {
            let path = cycle.into_iter().map(result_key).collect::<Vec<_>>().join(" -> ");
            Err(BridgeError::Validation(format!("dependency cycle {path}")))
        }
        None => Ok(()),
    }
}

/// Last successful result per cell, scoped by project.
#[derive(Debug, Default)]
pub struct ResultNamespace {
    inner: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl ResultNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, project: &str, cell_id: i64, value: Value) {
        self.inner
            .write()
            .await
            .entry(project.to_string())
            .or_default()
            .insert(result_key(cell_id), value);
    }

    pub async fn snapshot(&self, project: &str) -> HashMap<String, Value> {
        self.inner.read().await.get(project).cloned().unwrap_or_default()
    }
}

/// Re-execution plan for one successful root cell.
///
/// Candidates are visited in topological order; a candidate runs only when
/// at least one of its upstream cells refreshed during this cascade, so a
/// failure stops propagation along its branch. Each cell runs at most once
/// and the whole cascade at most `budget` times.
#[derive(Debug)]
pub struct Cascade {
    graph: DependencyGraph,
    pending: VecDeque<i64>,
    refreshed: HashSet<i64>,
    budget: usize,
    launched: usize,
}

impl Cascade {
    pub fn plan(cells: &[Cell], root: i64, budget: usize) -> Self {
        let graph = DependencyGraph::from_cells(cells);
        let pending = graph.downstream_order(root).into();
        Self {
            graph,
            pending,
            refreshed: HashSet::from([root]),
            budget,
            launched: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Next cell to re-execute, if any.
    pub fn next(&mut self) -> Option<i64> {
        while let Some(id) = self.pending.pop_front() {
            let ready = self
                .graph
                .upstream(id)
                .is_some_and(|deps| deps.iter().any(|d| self.refreshed.contains(d)));
            if !ready {
                continue;
            }
            if self.launched >= self.budget {
                warn!(budget = self.budget, skipped = self.pending.len() + 1, "cascade budget exhausted");
                self.pending.clear();
                return None;
            }
            self.launched += 1;
            return Some(id);
        }
        None
    }

    /// Record that `id` produced a fresh result.
    pub fn mark_refreshed(&mut self, id: i64) {
        self.refreshed.insert(id);
    }

    pub fn launched(&self) -> usize {
        self.launched
    }
}
