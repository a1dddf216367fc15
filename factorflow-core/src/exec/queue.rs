//! Ready Queue
//!
//! Shared queue of runnable tasks for the dependency-driven strategy, built
//! on a crossbeam `Injector`. Consumers that find it empty spin briefly and
//! then yield until a task shows up or the queue is closed. Closing is
//! final: every consumer leaves and queued tasks are abandoned.

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_deque::{Injector, Steal};

use crate::graph::TaskId;

/// Empty polls spent spinning before a consumer starts yielding.
const SPIN_LIMIT: u32 = 64;

pub(crate) struct ReadyQueue {
    tasks: Injector<TaskId>,
    closed: AtomicBool,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Injector::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, id: TaskId) {
        self.tasks.push(id);
    }

    pub(crate) fn extend<I: IntoIterator<Item = TaskId>>(&self, ids: I) {
        for id in ids {
            self.tasks.push(id);
        }
    }

    /// Tell every consumer to leave.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// The next task, or `None` once the queue is closed. Waits while the
    /// queue is empty.
    pub(crate) fn pop(&self) -> Option<TaskId> {
        let mut spins = 0;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            match self.tasks.steal() {
                Steal::Success(id) => return Some(id),
                Steal::Retry => {}
                Steal::Empty if spins < SPIN_LIMIT => {
                    spins += 1;
                    hint::spin_loop();
                }
                Steal::Empty => thread::yield_now(),
            }
        }
    }
}
