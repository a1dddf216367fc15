//! Single-threaded strategy: construction order on the calling thread.

use super::RunState;
use crate::model::Model;

pub(crate) fn run<M>(state: &RunState<'_, M>)
where
    M: Model + ?Sized,
{
    for node in state.graph().nodes() {
        if state.should_stop() {
            return;
        }
        let id = node.id();
        if !state.check_ready(id) || !state.run_task(id) || !state.release_dependents(id, |_| {}) {
            return;
        }
    }
}
