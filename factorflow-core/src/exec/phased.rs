//! Phase-barrier strategy.
//!
//! Every worker walks every phase in order and meets the others at a barrier
//! after each one, including phases where it found nothing to do and phases
//! reached after a halt. Within a phase, worker `w` owns the `w`-th
//! contiguous shard of `ceil(len / workers)` items, held in a FIFO
//! crossbeam deque. Owner and thieves both take items through the shard's
//! `Stealer`, one at a time, so no item is ever run twice.

use std::sync::Barrier;

use crossbeam_deque::{Steal, Stealer, Worker};

use super::pool::Crew;
use super::RunState;
use crate::graph::TaskId;
use crate::model::Model;

/// Split one phase into `workers` contiguous shards.
///
/// The `Worker` ends must outlive every use of the returned stealers.
fn shard(bucket: &[TaskId], workers: usize) -> (Vec<Worker<TaskId>>, Vec<Stealer<TaskId>>) {
    let shard_len = bucket.len().div_ceil(workers).max(1);
    let queues: Vec<Worker<TaskId>> = (0..workers).map(|_| Worker::new_fifo()).collect();
    for (queue, items) in queues.iter().zip(bucket.chunks(shard_len)) {
        for &id in items {
            queue.push(id);
        }
    }
    let stealers = queues.iter().map(Worker::stealer).collect();
    (queues, stealers)
}

/// Take the next item of a shard.
fn claim(shard: &Stealer<TaskId>) -> Option<TaskId> {
    loop {
        match shard.steal() {
            Steal::Success(id) => return Some(id),
            Steal::Empty => return None,
            Steal::Retry => {}
        }
    }
}

/// Run one iteration of the graph held by `state`.
pub(crate) fn run<M>(crew: &Crew, state: &RunState<'_, M>, stealing: bool)
where
    M: Model + ?Sized,
{
    let workers = crew.size();
    let (_queues, phases): (Vec<_>, Vec<_>) = state
        .graph()
        .phases()
        .iter()
        .map(|bucket| shard(bucket, workers))
        .unzip();
    let barrier = Barrier::new(workers);

    crew.broadcast(|worker| {
        for shards in &phases {
            run_phase(state, shards, worker, stealing);
            barrier.wait();
        }
    });
}

fn run_phase<M>(
    state: &RunState<'_, M>,
    shards: &[Stealer<TaskId>],
    worker: usize,
    stealing: bool,
) where
    M: Model + ?Sized,
{
    let workers = shards.len();
    let visits = if stealing { workers } else { 1 };

    // Own shard first, then the others round-robin starting at the neighbour.
    for step in 0..visits {
        let shard = &shards[(worker + step) % workers];
        loop {
            if state.should_stop() {
                return;
            }
            let Some(id) = claim(shard) else {
                break;
            };
            if !state.check_ready(id)
                || !state.run_task(id)
                || !state.release_dependents(id, |_| {})
            {
                return;
            }
        }
    }
}
