//! Execution Engine
//!
//! Replays a [`DependencyGraph`] against a [`Model`] on a shared
//! [`WorkerPool`].
//!
//! # Overview
//!
//! One call to [`ExecutionEngine::iterate`] runs the graph a given number of
//! times. Before every iteration all dependency counters are restored, then
//! the configured strategy runs each node exactly once:
//!
//! - [`ExecutionStrategy::PhaseBarrier`]: phases run one after another. A
//!   phase is cut into one contiguous shard per worker and every worker
//!   waits on a barrier before the next phase starts. With work stealing, a
//!   worker that empties its own shard takes single items from the others.
//! - [`ExecutionStrategy::DependencyDriven`]: a task is queued the moment its
//!   last dependency finishes. Workers share one queue and leave once it is
//!   closed, either after the last task or on a halt.
//! - [`ExecutionStrategy::Sequential`]: construction order on the calling
//!   thread. Every dependency precedes its dependents in that order.
//!
//! # Failure Handling
//!
//! The first error raised by any task wins. Once an error is recorded, or
//! the cancellation token is observed, no further task is claimed; tasks
//! already running finish normally and `iterate` returns after every worker
//! has stopped. Cancellation surfaces as [`SchedulerError::Interrupted`]
//! unless a task failed first.
//!
//! # Pool Leases
//!
//! `iterate` leases the pool's current workers once and runs every
//! iteration on them. A concurrent [`WorkerPool::resize`] or
//! [`WorkerPool::shutdown`] only affects later calls.

mod cancel;
mod driven;
mod phased;
mod pool;
mod queue;
mod sequential;

pub use cancel::CancellationToken;
pub use pool::WorkerPool;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::{ExecutionStrategy, ExecutorConfig};
use crate::error::{Result, SchedulerError};
use crate::graph::{DependencyGraph, TaskId};
use crate::model::Model;

/// Runs dependency graphs on a worker pool.
#[derive(Debug)]
pub struct ExecutionEngine {
    pool: Arc<WorkerPool>,
    config: ExecutorConfig,
}

impl ExecutionEngine {
    /// Create an engine on an existing pool. The pool may be shared with
    /// other engines; `config.worker_pool_size` is not applied to it.
    pub fn new(pool: Arc<WorkerPool>, config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    /// Create an engine with a pool of its own, sized from the config.
    pub fn with_config(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::new(config.worker_pool_size)?);
        Ok(Self { pool, config })
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.config.strategy
    }

    pub fn set_strategy(&mut self, strategy: ExecutionStrategy) {
        self.config.strategy = strategy;
    }

    pub fn set_work_stealing(&mut self, enabled: bool) {
        self.config.work_stealing = enabled;
    }

    pub fn set_node_locking(&mut self, enabled: bool) {
        self.config.node_locking = enabled;
    }

    /// Resize the underlying pool. Graphs stay valid; the next `iterate`
    /// call simply shards over the new worker count.
    pub fn resize_pool(&mut self, size: usize) -> Result<()> {
        self.pool.resize(size)?;
        self.config.worker_pool_size = size;
        Ok(())
    }

    /// Run `graph` `iterations` times against `model`.
    ///
    /// Returns after every worker has stopped touching the model, whatever
    /// the outcome. A graph's counters belong to one call at a time: do not
    /// iterate the same graph from two threads concurrently.
    pub fn iterate<M>(
        &self,
        graph: &Arc<DependencyGraph>,
        model: &Arc<M>,
        iterations: usize,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        M: Model + ?Sized,
    {
        if iterations == 0 || graph.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let strategy = self.config.strategy;
        // Leased once: a resize from another thread must not change the
        // worker count between iterations of this call.
        let crew = match strategy {
            ExecutionStrategy::Sequential => None,
            _ => Some(self.pool.lease()?),
        };
        let state = RunState::new(graph, &**model, cancel.clone(), self.config.node_locking);

        let mut completed = 0;
        for _ in 0..iterations {
            if state.should_stop() {
                break;
            }

            graph.reset_counters();
            match (&crew, strategy) {
                (Some(crew), ExecutionStrategy::PhaseBarrier) => {
                    phased::run(crew, &state, self.config.work_stealing)
                }
                (Some(crew), ExecutionStrategy::DependencyDriven) => driven::run(crew, &state),
                _ => sequential::run(&state),
            }

            if state.is_halted() {
                break;
            }
            completed += 1;
        }

        let result = state.finish();
        if matches!(result, Err(SchedulerError::Interrupted)) {
            warn!(completed, iterations, "iterate interrupted");
        }
        debug!(
            ?strategy,
            iterations,
            completed,
            tasks = graph.len(),
            executed = state.executed(),
            ok = result.is_ok(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "iterate finished"
        );
        result
    }
}

/// State shared by every worker during one `iterate` call.
pub(crate) struct RunState<'a, M: ?Sized> {
    graph: &'a DependencyGraph,
    model: &'a M,
    cancel: CancellationToken,
    node_locking: bool,

    /// Set once no further task may be claimed.
    halted: AtomicBool,

    /// Set when the halt came from the cancellation token.
    interrupted: AtomicBool,

    /// First error raised by any worker.
    failure: Mutex<Option<SchedulerError>>,

    /// Tasks completed successfully across all iterations.
    executed: AtomicUsize,
}

impl<'a, M: Model + ?Sized> RunState<'a, M> {
    fn new(
        graph: &'a DependencyGraph,
        model: &'a M,
        cancel: CancellationToken,
        node_locking: bool,
    ) -> Self {
        Self {
            graph,
            model,
            cancel,
            node_locking,
            halted: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            failure: Mutex::new(None),
            executed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn graph(&self) -> &'a DependencyGraph {
        self.graph
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Whether workers must stop claiming tasks. Observes cancellation.
    pub(crate) fn should_stop(&self) -> bool {
        if self.is_halted() {
            return true;
        }
        if self.cancel.is_cancelled() {
            self.interrupted.store(true, Ordering::Release);
            self.halted.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Record a failure and halt the run. Later failures are dropped.
    pub(crate) fn fail(&self, err: SchedulerError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.halted.store(true, Ordering::Release);
    }

    /// Fail unless every dependency of `id` has completed.
    pub(crate) fn check_ready(&self, id: TaskId) -> bool {
        let remaining = self.graph.node(id).remaining();
        if remaining == 0 {
            return true;
        }
        self.fail(SchedulerError::InvariantViolation(format!(
            "{} started with {} unfinished dependencies",
            id, remaining
        )));
        false
    }

    /// Run one task's update. Returns false if it failed or panicked, in
    /// which case the failure has been recorded.
    pub(crate) fn run_task(&self, id: TaskId) -> bool {
        let node = self.graph.node(id);
        let task = node.task();

        let guard = self
            .node_locking
            .then(|| self.graph.node_lock(node).lock());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.model.execute(task)));
        drop(guard);

        match outcome {
            Ok(Ok(())) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                trace!(%task, "task finished");
                true
            }
            Ok(Err(source)) => {
                warn!(%task, error = %source, "task failed");
                self.fail(SchedulerError::TaskFailed { task, source });
                false
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%task, %message, "task panicked");
                self.fail(SchedulerError::TaskPanicked { task, message });
                false
            }
        }
    }

    /// Count `id` as finished for each of its dependents and hand every
    /// dependent whose counter reached zero to `ready`. Returns false if a
    /// counter would have dropped below zero.
    pub(crate) fn release_dependents<F>(&self, id: TaskId, mut ready: F) -> bool
    where
        F: FnMut(TaskId),
    {
        for &dependent in self.graph.node(id).dependents() {
            match self.graph.node(dependent).complete_dependency() {
                Ok(true) => ready(dependent),
                Ok(false) => {}
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    /// Outcome of the run. A task failure takes precedence over
    /// interruption.
    pub(crate) fn finish(&self) -> Result<()> {
        if let Some(err) = self.failure.lock().take() {
            return Err(err);
        }
        if self.interrupted.load(Ordering::Acquire) {
            return Err(SchedulerError::Interrupted);
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
