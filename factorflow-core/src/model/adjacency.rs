//! In-memory Adjacency Model
//!
//! A small undirected model that stores one scalar message per directed edge.
//! Node updates recompute every outgoing message of a node from the messages
//! arriving on its other edges; edge updates recompute a single outgoing
//! message. The combination function is pluggable via [`MessageRule`].
//!
//! Besides the messages, the model records how many times each node was
//! updated and a global completion stamp for every update, which lets tests
//! assert both final state and execution order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::{DirectedEdge, Model, NodeId};
use crate::error::{Result, SchedulerError, TaskError};
use crate::task::LeafTask;

/// Value of a message that has never been written.
pub const INITIAL_MESSAGE: f64 = 1.0;

/// Computes the message `from -> to` given the messages arriving at `from`
/// on every edge except the one from `to`, in neighbour order.
pub type MessageRule = Arc<dyn Fn(NodeId, NodeId, &[f64]) -> f64 + Send + Sync>;

fn default_rule() -> MessageRule {
    Arc::new(|from, to, inputs| {
        let total: f64 = inputs.iter().sum();
        0.5 * total.ln_1p() + 0.01 * f64::from(from.raw()) - 0.001 * f64::from(to.raw())
    })
}

/// Undirected in-memory model with scalar messages.
pub struct AdjacencyModel {
    /// Structural version, bumped on every node or edge insertion.
    version: u64,

    /// Ordered neighbour list per node, indexed by `NodeId::index`.
    adjacency: Vec<Vec<NodeId>>,

    /// Current message on each directed edge.
    messages: DashMap<DirectedEdge, f64>,

    /// Number of completed updates per node.
    update_counts: Vec<AtomicU64>,

    /// Completion stamps per node, in completion order.
    stamps: DashMap<NodeId, Vec<u64>>,

    /// Source of completion stamps.
    clock: AtomicU64,

    rule: MessageRule,
}

impl AdjacencyModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self {
            version: 0,
            adjacency: Vec::new(),
            messages: DashMap::new(),
            update_counts: Vec::new(),
            stamps: DashMap::new(),
            clock: AtomicU64::new(0),
            rule: default_rule(),
        }
    }

    /// Create a model with `count` isolated nodes.
    pub fn with_nodes(count: usize) -> Self {
        let mut model = Self::new();
        for _ in 0..count {
            model.add_node();
        }
        model
    }

    /// Create a model with `count` nodes and the given undirected edges.
    pub fn from_edges(count: usize, edges: &[(u32, u32)]) -> Result<Self> {
        let mut model = Self::with_nodes(count);
        for &(a, b) in edges {
            model.add_edge(NodeId::new(a), NodeId::new(b))?;
        }
        Ok(model)
    }

    /// Replace the message rule.
    pub fn with_rule(mut self, rule: MessageRule) -> Self {
        self.rule = rule;
        self
    }

    /// Add an isolated node and return its id.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId::new(self.adjacency.len() as u32);
        self.adjacency.push(Vec::new());
        self.update_counts.push(AtomicU64::new(0));
        self.version += 1;
        id
    }

    /// Connect two existing nodes.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        for node in [a, b] {
            if node.index() >= self.adjacency.len() {
                return Err(SchedulerError::UnknownNode(node));
            }
        }
        self.adjacency[a.index()].push(b);
        self.adjacency[b.index()].push(a);
        self.version += 1;
        Ok(())
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Current message on `edge`.
    pub fn message(&self, edge: DirectedEdge) -> f64 {
        self.messages
            .get(&edge)
            .map(|value| *value)
            .unwrap_or(INITIAL_MESSAGE)
    }

    /// Every written message, sorted by edge for comparison.
    pub fn messages(&self) -> Vec<(DirectedEdge, f64)> {
        let mut all: Vec<_> = self
            .messages
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        all.sort_by_key(|(edge, _)| (edge.from, edge.to));
        all
    }

    /// Number of completed updates of `node`.
    pub fn update_count(&self, node: NodeId) -> u64 {
        self.update_counts
            .get(node.index())
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Completion stamps of `node`'s updates, oldest first.
    pub fn completion_stamps(&self, node: NodeId) -> Vec<u64> {
        self.stamps
            .get(&node)
            .map(|stamps| stamps.clone())
            .unwrap_or_default()
    }

    /// Forget all messages, counters and stamps. Structure is kept.
    pub fn reset_state(&self) {
        self.messages.clear();
        self.stamps.clear();
        for count in &self.update_counts {
            count.store(0, Ordering::SeqCst);
        }
        self.clock.store(0, Ordering::SeqCst);
    }

    fn incoming_except(&self, node: NodeId, skip: usize) -> Vec<f64> {
        self.adjacency[node.index()]
            .iter()
            .enumerate()
            .filter(|(port, _)| *port != skip)
            .map(|(_, &neighbor)| self.message(DirectedEdge::new(neighbor, node)))
            .collect()
    }

    fn write_port(&self, node: NodeId, port: usize) {
        let to = self.adjacency[node.index()][port];
        let inputs = self.incoming_except(node, port);
        let value = (self.rule)(node, to, &inputs);
        self.messages.insert(DirectedEdge::new(node, to), value);
    }

    fn record_completion(&self, node: NodeId) {
        self.update_counts[node.index()].fetch_add(1, Ordering::SeqCst);
        let stamp = self.clock.fetch_add(1, Ordering::SeqCst);
        self.stamps.entry(node).or_default().push(stamp);
    }
}

impl Default for AdjacencyModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for AdjacencyModel {
    fn version(&self) -> u64 {
        self.version
    }

    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.adjacency.get(node.index()).map(Vec::as_slice)
    }

    fn execute(&self, task: LeafTask) -> std::result::Result<(), TaskError> {
        let node = task.node();
        let degree = self
            .neighbors(node)
            .ok_or_else(|| format!("unknown node {node}"))?
            .len();

        match task {
            LeafTask::Node(_) => {
                for port in 0..degree {
                    self.write_port(node, port);
                }
            }
            LeafTask::Edge { port, .. } => {
                if port >= degree {
                    return Err(format!("port {port} out of range for {node}").into());
                }
                self.write_port(node, port);
            }
        }

        self.record_completion(node);
        Ok(())
    }
}
