//! Update Tasks and Schedules
//!
//! A schedule is an ordered sequence of update tasks supplied by whatever
//! component decides the logical update order (flooding, random, user
//! specified). Tasks come in three kinds:
//!
//! - `Node`: recompute the outgoing message on every edge of a node.
//! - `Edge`: recompute the message on one outgoing edge, reading all other
//!   incoming edges of the node.
//! - `Composite`: a nested schedule, expanded in place during graph
//!   construction and never scheduled itself.
//!
//! [`LeafTask`] is the flattened form. Dependency graphs only ever store
//! leaves, so a composite can never end up as a graph node.

use std::fmt;

use crate::error::{Result, SchedulerError};
use crate::model::NodeId;

/// Discriminant of an [`UpdateTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    NodeUpdate,
    EdgeUpdate,
    Composite,
}

/// One entry of a schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateTask {
    /// Update every outgoing edge of `node`.
    Node(NodeId),

    /// Update the outgoing edge at position `port` of `node`'s neighbour list.
    Edge { node: NodeId, port: usize },

    /// An ordered nested schedule.
    Composite(Schedule),
}

impl UpdateTask {
    /// Build a composite from a list of children.
    pub fn composite(children: Vec<UpdateTask>) -> Self {
        UpdateTask::Composite(Schedule::Fixed(children))
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            UpdateTask::Node(_) => TaskKind::NodeUpdate,
            UpdateTask::Edge { .. } => TaskKind::EdgeUpdate,
            UpdateTask::Composite(_) => TaskKind::Composite,
        }
    }

    /// The leaf form of this task, or `None` for composites.
    pub fn as_leaf(&self) -> Option<LeafTask> {
        match *self {
            UpdateTask::Node(node) => Some(LeafTask::Node(node)),
            UpdateTask::Edge { node, port } => Some(LeafTask::Edge { node, port }),
            UpdateTask::Composite(_) => None,
        }
    }
}

impl From<LeafTask> for UpdateTask {
    fn from(leaf: LeafTask) -> Self {
        match leaf {
            LeafTask::Node(node) => UpdateTask::Node(node),
            LeafTask::Edge { node, port } => UpdateTask::Edge { node, port },
        }
    }
}

/// A schedulable (non-composite) task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafTask {
    Node(NodeId),
    Edge { node: NodeId, port: usize },
}

impl LeafTask {
    /// The node whose messages this task recomputes.
    pub fn node(&self) -> NodeId {
        match *self {
            LeafTask::Node(node) | LeafTask::Edge { node, .. } => node,
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            LeafTask::Node(_) => TaskKind::NodeUpdate,
            LeafTask::Edge { .. } => TaskKind::EdgeUpdate,
        }
    }
}

impl fmt::Display for LeafTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafTask::Node(node) => write!(f, "node({node})"),
            LeafTask::Edge { node, port } => write!(f, "edge({node}, port {port})"),
        }
    }
}

/// An ordered sequence of update tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// The order is known ahead of time and identical on every iteration.
    Fixed(Vec<UpdateTask>),

    /// The next task is chosen at run time. Cannot be turned into a
    /// dependency graph.
    Dynamic { name: String },
}

impl Schedule {
    /// A fixed schedule that updates each node once, in the given order.
    pub fn flooding<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        Schedule::Fixed(nodes.into_iter().map(UpdateTask::Node).collect())
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Schedule::Fixed(_))
    }

    /// Expand nested composites into the leaf sequence they stand for.
    pub fn flatten(&self) -> Result<Vec<LeafTask>> {
        let mut leaves = Vec::new();
        self.visit_leaves(&mut |leaf| {
            leaves.push(leaf);
            Ok(())
        })?;
        Ok(leaves)
    }

    /// Call `visit` for every leaf in order, recursing into composites.
    ///
    /// Fails on the first dynamic schedule encountered, top-level or nested.
    pub fn visit_leaves<F>(&self, visit: &mut F) -> Result<()>
    where
        F: FnMut(LeafTask) -> Result<()>,
    {
        let tasks = match self {
            Schedule::Fixed(tasks) => tasks,
            Schedule::Dynamic { name } => {
                return Err(SchedulerError::UnsupportedSchedule(name.clone()))
            }
        };

        for task in tasks {
            match task {
                UpdateTask::Composite(inner) => inner.visit_leaves(visit)?,
                leaf => {
                    if let Some(leaf) = leaf.as_leaf() {
                        visit(leaf)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<UpdateTask> for Schedule {
    fn from_iter<I: IntoIterator<Item = UpdateTask>>(iter: I) -> Self {
        Schedule::Fixed(iter.into_iter().collect())
    }
}
