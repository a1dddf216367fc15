//! Worker Pool
//!
//! A resizable set of named rayon worker threads shared by every engine that
//! holds the pool. The pool is an ordinary value with an explicit lifecycle:
//! create it, resize it, shut it down. There is no process-wide instance.
//!
//! # Dispatch
//!
//! The only operation workers understand is a broadcast: run one closure on
//! every thread of the crew with that thread's index and wait until all of
//! them return. Broadcasts through one crew are serialised by a dispatch
//! lock, so two barrier jobs from engines sharing the pool never interleave.
//!
//! # Resizing
//!
//! Each `iterate` call leases the current crew once and runs all of its
//! iterations on it. `resize` and `shutdown` swap the crew out without
//! waiting; a leased crew keeps its threads until the last lease is dropped,
//! so only later calls see the new size. A crew nobody leases is stopped on
//! the spot and its threads get a bounded grace period to exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::config::default_pool_size;
use crate::error::{Result, SchedulerError};

/// How long shutdown waits for workers to exit before detaching them.
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Counts the threads of a crew that are still running. Counted down from
/// rayon's exit handler.
struct ExitLatch {
    running: Mutex<usize>,
    exited: Condvar,
}

impl ExitLatch {
    fn new(running: usize) -> Arc<Self> {
        Arc::new(Self {
            running: Mutex::new(running),
            exited: Condvar::new(),
        })
    }

    fn count_down(&self) {
        let mut running = self.running.lock();
        *running = running.saturating_sub(1);
        if *running == 0 {
            self.exited.notify_all();
        }
    }

    /// Wait until every thread exited or `timeout` passed. Returns true in
    /// the first case.
    fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut running = self.running.lock();
        while *running > 0 {
            if self.exited.wait_until(&mut running, deadline).timed_out() {
                return *running == 0;
            }
        }
        true
    }
}

/// One generation of worker threads.
pub(crate) struct Crew {
    threads: ThreadPool,
    exits: Arc<ExitLatch>,
    dispatch: Mutex<()>,
}

impl Crew {
    fn spawn(size: usize) -> Result<Self> {
        let exits = ExitLatch::new(size);
        let on_exit = Arc::clone(&exits);
        let threads = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("factorflow-worker-{index}"))
            .exit_handler(move |_| on_exit.count_down())
            .build()?;

        Ok(Self {
            threads,
            exits,
            dispatch: Mutex::new(()),
        })
    }

    pub(crate) fn size(&self) -> usize {
        self.threads.current_num_threads()
    }

    /// Run `job` on every worker with the worker's index and wait for all of
    /// them to return.
    pub(crate) fn broadcast<F>(&self, job: F)
    where
        F: Fn(usize) + Sync,
    {
        let _order = self.dispatch.lock();
        self.threads.broadcast(|ctx| job(ctx.index()));
    }

    fn stop(self) {
        let Self { threads, exits, .. } = self;
        let workers = threads.current_num_threads();
        drop(threads);

        let clean = exits.wait_for(SHUTDOWN_GRACE);
        if !clean {
            warn!(workers, "workers did not stop in time, detaching");
        }
        debug!(workers, clean, "stopped worker threads");
    }
}

/// Stop `crew` now if nothing leases it. Otherwise its threads exit when
/// the last lease is dropped.
fn retire(crew: Arc<Crew>) {
    match Arc::try_unwrap(crew) {
        Ok(crew) => crew.stop(),
        Err(leased) => debug!(
            workers = leased.size(),
            "crew still leased, stopping after the running iterate"
        ),
    }
}

/// A resizable pool of worker threads.
pub struct WorkerPool {
    crew: RwLock<Option<Arc<Crew>>>,
}

impl WorkerPool {
    /// Start a pool with `size` workers.
    pub fn new(size: usize) -> Result<Self> {
        check_size(size)?;
        let crew = Crew::spawn(size)?;
        info!(workers = size, "started worker pool");
        Ok(Self {
            crew: RwLock::new(Some(Arc::new(crew))),
        })
    }

    /// Start a pool with one worker per available core.
    pub fn with_default_size() -> Result<Self> {
        Self::new(default_pool_size())
    }

    /// Current number of workers. Zero after shutdown.
    pub fn size(&self) -> usize {
        self.crew.read().as_ref().map_or(0, |crew| crew.size())
    }

    pub fn is_shut_down(&self) -> bool {
        self.crew.read().is_none()
    }

    /// Replace the workers with a fresh set of `size` threads.
    ///
    /// Calls already running keep the workers they started with. A pool
    /// that was shut down comes back to life.
    pub fn resize(&self, size: usize) -> Result<()> {
        check_size(size)?;
        let crew = Arc::new(Crew::spawn(size)?);
        let previous = self.crew.write().replace(crew);

        let from = previous.as_ref().map_or(0, |crew| crew.size());
        if let Some(previous) = previous {
            retire(previous);
        }
        info!(from, to = size, "resized worker pool");
        Ok(())
    }

    /// Stop every worker. Later calls fail with `PoolShutDown`; calls
    /// already running finish on their leased workers.
    pub fn shutdown(&self) {
        let previous = self.crew.write().take();
        if let Some(previous) = previous {
            retire(previous);
        }
    }

    /// The current crew, held for the duration of one `iterate` call.
    pub(crate) fn lease(&self) -> Result<Arc<Crew>> {
        self.crew.read().clone().ok_or(SchedulerError::PoolShutDown)
    }
}

fn check_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(SchedulerError::InvalidConfig(
            "worker pool size must be positive".to_string(),
        ));
    }
    Ok(())
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(crew) = self.crew.get_mut().take() {
            retire(crew);
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .finish()
    }
}
