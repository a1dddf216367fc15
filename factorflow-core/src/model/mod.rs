//! Model Boundary
//!
//! The factor graph itself lives outside this crate. The scheduler only needs
//! three things from it:
//!
//! 1. A structural version stamp that changes whenever nodes or edges are
//!    added or removed. Cached dependency graphs are keyed by it.
//! 2. The ordered neighbour list of each node. Edge updates address their
//!    output edge by its position (port) in this list.
//! 3. A way to run the numeric update of a single task.
//!
//! The [`Model`] trait captures exactly that contract. [`AdjacencyModel`] is
//! an in-memory implementation used by the test suite and benchmarks.

mod adjacency;

pub use adjacency::{AdjacencyModel, MessageRule};

use std::fmt;

use crate::error::TaskError;
use crate::task::LeafTask;

/// Identifier of a node in the external model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Wrap a raw node index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw index.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// The raw index as a `usize`, for indexing dense tables.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One direction of communication across a model edge.
///
/// Used purely as a dependency key: two tasks conflict when they touch the
/// same directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectedEdge {
    pub from: NodeId,
    pub to: NodeId,
}

impl DirectedEdge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }

    /// The same edge in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for DirectedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// The external model a dependency graph is built from and executed against.
///
/// Implementations must be safe to share across worker threads. `execute` is
/// called without any locking on the model's side; the scheduler guarantees
/// that no two concurrently running tasks touch the same directed edge and
/// additionally serialises tasks that target the same node.
pub trait Model: Send + Sync {
    /// Structural version stamp. Must change if and only if nodes or edges
    /// are added or removed.
    fn version(&self) -> u64;

    /// Ordered neighbours of `node`, or `None` if the node does not exist.
    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]>;

    /// Perform the numeric update for one task.
    fn execute(&self, task: LeafTask) -> Result<(), TaskError>;
}
