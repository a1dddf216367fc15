//! Graph Nodes
//!
//! This module defines the node type that lives in the dependency graph.
//! Each node wraps exactly one leaf task.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use smallvec::SmallVec;

use crate::error::{Result, SchedulerError};
use crate::task::LeafTask;

/// Index of a node in the dependency graph's arena.
///
/// Assigned in construction order, which is also the flattened schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// Id of the node at arena position `index`.
    pub(crate) fn try_from_index(index: usize) -> Result<Self> {
        u32::try_from(index)
            .map(Self)
            .map_err(|_| SchedulerError::GraphTooLarge)
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap())
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Position in the graph's node list.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Small inline list of task ids. Most tasks have only a handful of links.
pub type TaskList = SmallVec<[TaskId; 4]>;

/// A node in the dependency graph.
#[derive(Debug)]
pub struct DependencyNode {
    /// Stable identifier, equal to the node's arena index.
    id: TaskId,

    /// The update this node runs.
    task: LeafTask,

    /// Execution wave. Zero when the node has no dependencies.
    phase: usize,

    /// Distinct nodes this node waits for.
    dependencies: TaskList,

    /// Nodes that wait for this node.
    dependents: TaskList,

    /// Dependencies not yet completed in the current iteration.
    remaining: AtomicUsize,

    /// Slot of the advisory lock guarding the task's target node.
    lock_slot: usize,
}

impl DependencyNode {
    pub(crate) fn new(id: TaskId, task: LeafTask, lock_slot: usize) -> Self {
        Self {
            id,
            task,
            phase: 0,
            dependencies: TaskList::new(),
            dependents: TaskList::new(),
            remaining: AtomicUsize::new(0),
            lock_slot,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task(&self) -> LeafTask {
        self.task
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Number of distinct dependencies discovered at construction time.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn dependents(&self) -> &[TaskId] {
        &self.dependents
    }

    pub(crate) fn lock_slot(&self) -> usize {
        self.lock_slot
    }

    /// Record a dependency on a node with the given phase.
    ///
    /// Returns false if the dependency was already present.
    pub(crate) fn add_dependency(&mut self, dependency: TaskId, dependency_phase: usize) -> bool {
        if self.dependencies.contains(&dependency) {
            return false;
        }
        self.dependencies.push(dependency);
        self.phase = self.phase.max(dependency_phase + 1);
        self.remaining.store(self.dependencies.len(), Ordering::Relaxed);
        true
    }

    pub(crate) fn add_dependent(&mut self, dependent: TaskId) {
        self.dependents.push(dependent);
    }

    /// Counter value for the current iteration.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Restore the counter before an iteration starts.
    pub(crate) fn reset(&self) {
        self.remaining
            .store(self.dependencies.len(), Ordering::Release);
    }

    /// Count one completed dependency.
    ///
    /// Returns true when this was the last outstanding dependency. A
    /// decrement below zero means a dependency was recorded more often than
    /// it was counted, which is reported instead of wrapping.
    pub(crate) fn complete_dependency(&self) -> Result<bool> {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
        {
            Ok(previous) => Ok(previous == 1),
            Err(_) => Err(SchedulerError::InvariantViolation(format!(
                "dependency counter of {} ({}) dropped below zero",
                self.id, self.task
            ))),
        }
    }
}
