//! Error Types
//!
//! Every fallible operation in the crate returns [`SchedulerError`]. The
//! variants fall into four groups:
//!
//! - Construction errors: the schedule or model cannot be turned into a
//!   dependency graph (`UnsupportedSchedule`, `UnknownNode`, `InvalidPort`,
//!   `GraphTooLarge`).
//! - Execution errors: a task's numeric work failed or panicked.
//! - Invariant violations: the graph's bookkeeping is inconsistent. These
//!   indicate a construction bug and are never recoverable.
//! - Interruption: a cancellation token was observed between tasks.
//!
//! Nothing in this crate retries; errors are handed to the caller of
//! `iterate` as-is.

use thiserror::Error;

use crate::model::NodeId;
use crate::task::LeafTask;

/// Error returned by a model's numeric update.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors raised while building or executing a dependency graph.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The schedule's order is not fixed ahead of time.
    #[error("cannot build a dependency graph for dynamic schedule `{0}`")]
    UnsupportedSchedule(String),

    /// A task targets a node the model does not know about.
    #[error("schedule references unknown node {0}")]
    UnknownNode(NodeId),

    /// An edge update names a port past the end of the node's edge list.
    #[error("node {node} has {degree} edges, port {port} is out of range")]
    InvalidPort {
        node: NodeId,
        port: usize,
        degree: usize,
    },

    /// The graph would need more nodes than a task id can address.
    #[error("dependency graph outgrows the largest task id t{}", u32::MAX)]
    GraphTooLarge,

    /// A task's numeric update returned an error.
    #[error("update {task} failed: {source}")]
    TaskFailed {
        task: LeafTask,
        #[source]
        source: TaskError,
    },

    /// A task's numeric update panicked.
    #[error("update {task} panicked: {message}")]
    TaskPanicked { task: LeafTask, message: String },

    /// Dependency bookkeeping is inconsistent.
    #[error("dependency graph invariant violated: {0}")]
    InvariantViolation(String),

    /// Cooperative cancellation was observed between tasks.
    #[error("iteration interrupted")]
    Interrupted,

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker threads could not be started.
    #[error("failed to start worker threads: {0}")]
    PoolSpawn(#[from] rayon::ThreadPoolBuildError),

    /// The worker pool has been shut down.
    #[error("worker pool has been shut down")]
    PoolShutDown,
}

impl SchedulerError {
    /// Whether this error is a deliberate interruption rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SchedulerError::Interrupted)
    }

    /// Whether this error came from a task's own numeric work.
    pub fn is_task_failure(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskFailed { .. } | SchedulerError::TaskPanicked { .. }
        )
    }
}
