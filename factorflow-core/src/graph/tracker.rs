//! Edge Touch Tracker
//!
//! Build-time map from a directed edge to the last graph node that touched
//! it. A task that touches an edge depends on whoever touched it before, and
//! then becomes the edge's last toucher itself. The tracker lives only while
//! a graph is being built.

use std::collections::HashMap;

use super::node::TaskId;
use crate::model::DirectedEdge;

#[derive(Debug, Default)]
pub struct EdgeTouchTracker {
    last: HashMap<DirectedEdge, TaskId>,
}

impl EdgeTouchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last node recorded for `edge`, if any.
    pub fn last_toucher(&self, edge: &DirectedEdge) -> Option<TaskId> {
        self.last.get(edge).copied()
    }

    /// Make `task` the last toucher of `edge`.
    pub fn touch(&mut self, edge: DirectedEdge, task: TaskId) {
        self.last.insert(edge, task);
    }
}
