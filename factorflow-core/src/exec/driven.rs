//! Dependency-driven strategy.
//!
//! The queue starts with the roots. A worker pops a task, runs it, counts it
//! against each dependent, and queues every dependent whose counter reaches
//! zero. The worker that finishes the last task of the iteration closes the
//! queue. On a halt, the worker that notices it closes the queue instead.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::pool::Crew;
use super::queue::ReadyQueue;
use super::RunState;
use crate::model::Model;

/// Run one iteration of the graph held by `state`.
pub(crate) fn run<M>(crew: &Crew, state: &RunState<'_, M>)
where
    M: Model + ?Sized,
{
    let graph = state.graph();
    let queue = ReadyQueue::new();
    queue.extend(graph.roots().iter().copied());
    let pending = AtomicUsize::new(graph.len());

    crew.broadcast(|_| drain(state, &queue, &pending));
}

fn drain<M>(state: &RunState<'_, M>, queue: &ReadyQueue, pending: &AtomicUsize)
where
    M: Model + ?Sized,
{
    loop {
        if state.should_stop() {
            queue.close();
            return;
        }

        let Some(id) = queue.pop() else {
            return;
        };

        // A halt may have happened while this worker waited in `pop`.
        if state.should_stop() {
            queue.close();
            return;
        }

        if !state.run_task(id) || !state.release_dependents(id, |next| queue.push(next)) {
            queue.close();
            return;
        }

        if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            queue.close();
            return;
        }
    }
}
