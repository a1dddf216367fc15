//! Dependency Graph
//!
//! This module implements the persistent task dependency graph that the
//! execution engine replays on every iteration.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent leaf update tasks of a flattened schedule
//! - Edges represent dependencies: if B must wait for A (they touch a common
//!   directed model edge and A comes first), there is an edge from A to B
//!
//! Every node carries a phase. Phase 0 holds the roots; any other node sits
//! one phase above its deepest dependency, so nodes sharing a phase never
//! depend on one another and can run concurrently once all lower phases are
//! done.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a flat arena indexed by [`TaskId`]. Dependency and
//!    dependent lists store indices, never references, which keeps the
//!    cyclic back-links free of ownership problems.
//!
//! 2. Structure (`phase`, dependencies, dependents) is immutable after
//!    construction and read by workers without locking. Only the per-node
//!    `remaining` counters change, atomically, and they are restored before
//!    each iteration so one graph can be replayed indefinitely.
//!
//! 3. The graph owns one advisory lock per distinct target node. Tasks hold
//!    it while their numeric update runs.

mod builder;
mod node;
mod tracker;

pub use builder::GraphBuilder;
pub use node::{DependencyNode, TaskId, TaskList};
pub use tracker::EdgeTouchTracker;

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{Result, SchedulerError};
use crate::task::LeafTask;

/// GraphViz colours, cycled by phase.
const PHASE_COLORS: [&str; 8] = [
    "red", "blue", "green", "pink", "purple", "gold", "black", "cyan",
];

/// A dependency graph built from one model version and schedule.
#[derive(Debug)]
pub struct DependencyGraph {
    /// All nodes, in construction order.
    nodes: Vec<DependencyNode>,

    /// Nodes without dependencies.
    roots: Vec<TaskId>,

    /// Node ids per phase, each bucket in construction order.
    phases: Vec<Vec<TaskId>>,

    /// Structural version of the model this graph was built from.
    version: u64,

    /// Number of schedule iterations unrolled into this graph.
    iterations: usize,

    /// Advisory lock per distinct target node.
    node_locks: Vec<Mutex<()>>,
}

impl DependencyGraph {
    pub(crate) fn from_parts(
        nodes: Vec<DependencyNode>,
        version: u64,
        iterations: usize,
        lock_count: usize,
    ) -> Self {
        let phase_count = nodes.iter().map(|n| n.phase() + 1).max().unwrap_or(0);
        let mut phases = vec![Vec::new(); phase_count];
        for node in &nodes {
            phases[node.phase()].push(node.id());
        }
        let roots = phases.first().cloned().unwrap_or_default();

        Self {
            nodes,
            roots,
            phases,
            version,
            iterations,
            node_locks: (0..lock_count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of nodes (tasks per replay).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by id.
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn node(&self, id: TaskId) -> &DependencyNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    /// Phase-0 nodes.
    pub fn roots(&self) -> &[TaskId] {
        &self.roots
    }

    /// Node ids grouped by phase.
    pub fn phases(&self) -> &[Vec<TaskId>] {
        &self.phases
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Tasks grouped by phase. Tasks in one group may run concurrently.
    pub fn phase_tasks(&self) -> Vec<Vec<LeafTask>> {
        self.phases
            .iter()
            .map(|bucket| bucket.iter().map(|&id| self.node(id).task()).collect())
            .collect()
    }

    /// Structural version of the model this graph was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of schedule iterations unrolled into the graph.
    pub fn unrolled_iterations(&self) -> usize {
        self.iterations
    }

    pub fn node_lock_count(&self) -> usize {
        self.node_locks.len()
    }

    pub(crate) fn node_lock(&self, node: &DependencyNode) -> &Mutex<()> {
        &self.node_locks[node.lock_slot()]
    }

    /// Restore every node's counter to its dependency count.
    pub(crate) fn reset_counters(&self) {
        for node in &self.nodes {
            node.reset();
        }
    }

    /// Check the structural invariants.
    ///
    /// Every dependency must sit in a strictly lower phase and appear in the
    /// dependent list of its predecessor exactly once, and the dependent
    /// lists must not name a node more often than it counts dependencies.
    pub fn validate(&self) -> Result<()> {
        let mut incoming = vec![0usize; self.nodes.len()];

        for node in &self.nodes {
            for &dependent in node.dependents() {
                let Some(slot) = incoming.get_mut(dependent.index()) else {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "{} lists unknown dependent {}",
                        node.id(),
                        dependent
                    )));
                };
                *slot += 1;
            }

            for &dependency in node.dependencies() {
                let predecessor = self.nodes.get(dependency.index()).ok_or_else(|| {
                    SchedulerError::InvariantViolation(format!(
                        "{} depends on unknown node {}",
                        node.id(),
                        dependency
                    ))
                })?;
                if predecessor.phase() >= node.phase() {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "{} (phase {}) depends on {} (phase {})",
                        node.id(),
                        node.phase(),
                        dependency,
                        predecessor.phase()
                    )));
                }
            }
        }

        for (node, &count) in self.nodes.iter().zip(&incoming) {
            if count != node.dependency_count() {
                return Err(SchedulerError::InvariantViolation(format!(
                    "{} is listed as a dependent {} times but counts {} dependencies",
                    node.id(),
                    count,
                    node.dependency_count()
                )));
            }
        }

        Ok(())
    }

    /// Render the graph in GraphViz dot format, one colour per phase.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph dependencies {\n");
        for node in &self.nodes {
            let color = PHASE_COLORS[node.phase() % PHASE_COLORS.len()];
            let _ = writeln!(
                out,
                "  {} [label=\"{}\", color=\"{}\"];",
                node.id().raw(),
                node.task(),
                color
            );
        }
        for node in &self.nodes {
            for dependent in node.dependents() {
                let _ = writeln!(out, "  {} -> {};", node.id().raw(), dependent.raw());
            }
        }
        out.push_str("}\n");
        out
    }

    /// Write [`to_dot`](Self::to_dot) output to a file.
    pub fn write_dot(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.to_dot())
    }

    /// Append `dependent` to `from`'s dependents without counting it.
    #[cfg(test)]
    pub(crate) fn inject_dependent(&mut self, from: TaskId, dependent: TaskId) {
        self.nodes[from.index()].add_dependent(dependent);
    }
}
