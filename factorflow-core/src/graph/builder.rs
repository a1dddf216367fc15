//! Graph Builder
//!
//! Turns a fixed schedule into a [`DependencyGraph`].
//!
//! # Algorithm
//!
//! Tasks are processed in flattened schedule order against one
//! [`EdgeTouchTracker`]:
//!
//! 1. Collect the directed edges the task touches. A node update touches
//!    both directions of every incident edge; an edge update touches its one
//!    output edge and every other incoming edge.
//! 2. For each touched edge, the previous toucher (if any) becomes a
//!    dependency. Shared edges are the only source of dependencies.
//! 3. The task becomes the last toucher of every edge it touched.
//! 4. Its phase is one more than the highest phase among its dependencies.
//!
//! When several iterations are unrolled into one graph, the task at position
//! `p` of iteration `i + 1` also waits for position `p` of iteration `i` and
//! for every dependent that task had acquired so far, so a damped update
//! always sees the value produced by the previous iteration.

use std::time::Instant;

use indexmap::IndexSet;
use tracing::debug;

use super::node::{DependencyNode, TaskId};
use super::tracker::EdgeTouchTracker;
use super::DependencyGraph;
use crate::error::{Result, SchedulerError};
use crate::model::{DirectedEdge, Model, NodeId};
use crate::task::{LeafTask, Schedule};

/// Builds dependency graphs from schedules over a model.
pub struct GraphBuilder<'m, M: Model + ?Sized> {
    model: &'m M,
    iterations: usize,
}

impl<'m, M: Model + ?Sized> GraphBuilder<'m, M> {
    /// Create a builder producing a single-iteration graph meant for replay.
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            iterations: 1,
        }
    }

    /// Unroll `iterations` copies of the schedule into one graph.
    pub fn unroll(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Build the graph. Fails on dynamic schedules and on tasks that do not
    /// match the model's structure.
    pub fn build(&self, schedule: &Schedule) -> Result<DependencyGraph> {
        let started = Instant::now();
        let mut state = BuildState::new(self.model);

        for iteration in 0..self.iterations {
            state.begin_iteration(iteration > 0);
            schedule.visit_leaves(&mut |leaf| state.add_leaf(leaf))?;
        }

        let graph = DependencyGraph::from_parts(
            state.nodes,
            self.model.version(),
            self.iterations,
            state.lock_slots.len(),
        );
        graph.validate()?;

        debug!(
            nodes = graph.len(),
            phases = graph.phase_count(),
            roots = graph.roots().len(),
            iterations = self.iterations,
            elapsed_us = started.elapsed().as_micros() as u64,
            "built dependency graph"
        );

        Ok(graph)
    }
}

struct BuildState<'m, M: Model + ?Sized> {
    model: &'m M,
    nodes: Vec<DependencyNode>,
    tracker: EdgeTouchTracker,

    /// Distinct target nodes; the index is the node's advisory lock slot.
    lock_slots: IndexSet<NodeId>,

    /// Tasks of the previous unrolled iteration, by flattened position.
    previous: Vec<TaskId>,

    /// Tasks of the iteration being built, by flattened position.
    current: Vec<TaskId>,

    /// Whether `previous` should be linked into the current iteration.
    link_previous: bool,

    touched: Vec<DirectedEdge>,
}

impl<'m, M: Model + ?Sized> BuildState<'m, M> {
    fn new(model: &'m M) -> Self {
        Self {
            model,
            nodes: Vec::new(),
            tracker: EdgeTouchTracker::new(),
            lock_slots: IndexSet::new(),
            previous: Vec::new(),
            current: Vec::new(),
            link_previous: false,
            touched: Vec::new(),
        }
    }

    fn begin_iteration(&mut self, link_previous: bool) {
        self.previous = std::mem::take(&mut self.current);
        self.link_previous = link_previous;
    }

    fn add_leaf(&mut self, leaf: LeafTask) -> Result<()> {
        self.collect_touched_edges(leaf)?;

        let id = TaskId::try_from_index(self.nodes.len())?;
        let (lock_slot, _) = self.lock_slots.insert_full(leaf.node());
        let mut node = DependencyNode::new(id, leaf, lock_slot);

        for edge in self.touched.drain(..) {
            if let Some(last) = self.tracker.last_toucher(&edge) {
                // A node whose neighbour list repeats a neighbour touches an
                // edge twice; it never depends on itself.
                if last != id {
                    Self::link(&mut self.nodes, last, &mut node);
                }
            }
            self.tracker.touch(edge, id);
        }

        if self.link_previous {
            if let Some(&counterpart) = self.previous.get(self.current.len()) {
                Self::link(&mut self.nodes, counterpart, &mut node);
                let carried = self.nodes[counterpart.index()].dependents().to_vec();
                for dependent in carried.into_iter().filter(|&dependent| dependent != id) {
                    Self::link(&mut self.nodes, dependent, &mut node);
                }
            }
        }

        self.nodes.push(node);
        self.current.push(id);
        Ok(())
    }

    fn link(nodes: &mut [DependencyNode], from: TaskId, to: &mut DependencyNode) {
        let from_node = &mut nodes[from.index()];
        if to.add_dependency(from, from_node.phase()) {
            from_node.add_dependent(to.id());
        }
    }

    fn collect_touched_edges(&mut self, leaf: LeafTask) -> Result<()> {
        let node = leaf.node();
        let model = self.model;
        let neighbors = model
            .neighbors(node)
            .ok_or(SchedulerError::UnknownNode(node))?;

        self.touched.clear();
        match leaf {
            LeafTask::Node(_) => {
                for &neighbor in neighbors {
                    self.touched.push(DirectedEdge::new(neighbor, node));
                    self.touched.push(DirectedEdge::new(node, neighbor));
                }
            }
            LeafTask::Edge { port, .. } => {
                let Some(&out) = neighbors.get(port) else {
                    return Err(SchedulerError::InvalidPort {
                        node,
                        port,
                        degree: neighbors.len(),
                    });
                };
                for (index, &neighbor) in neighbors.iter().enumerate() {
                    if index != port {
                        self.touched.push(DirectedEdge::new(neighbor, node));
                    }
                }
                self.touched.push(DirectedEdge::new(node, out));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AdjacencyModel;
    use crate::task::UpdateTask;

    fn n(raw: u32) -> NodeId {
        NodeId::new(raw)
    }

    fn path(len: usize) -> AdjacencyModel {
        let edges: Vec<(u32, u32)> = (1..len as u32).map(|i| (i - 1, i)).collect();
        AdjacencyModel::from_edges(len, &edges).unwrap()
    }

    fn phases(graph: &DependencyGraph) -> Vec<usize> {
        graph.nodes().iter().map(|node| node.phase()).collect()
    }

    #[test]
    fn path_schedule_forms_a_chain() {
        let model = path(5);
        let graph = GraphBuilder::new(&model)
            .build(&Schedule::flooding((0..5).map(n)))
            .unwrap();

        assert_eq!(phases(&graph), vec![0, 1, 2, 3, 4]);
        assert_eq!(graph.roots(), &[TaskId::from_index(0)]);
        for (index, node) in graph.nodes().iter().enumerate().skip(1) {
            assert_eq!(node.dependencies(), &[TaskId::from_index(index - 1)]);
        }
    }

    #[test]
    fn untouched_neighbours_stay_independent() {
        // 0-1 and 2-3 share no edge.
        let model = AdjacencyModel::from_edges(4, &[(0, 1), (2, 3)]).unwrap();
        let graph = GraphBuilder::new(&model)
            .build(&Schedule::flooding([n(0), n(2), n(1), n(3)]))
            .unwrap();

        assert_eq!(phases(&graph), vec![0, 0, 1, 1]);
        assert_eq!(graph.roots().len(), 2);
    }

    #[test]
    fn repeated_node_depends_on_itself_through_its_edges() {
        let model = path(2);
        let graph = GraphBuilder::new(&model)
            .build(&Schedule::flooding([n(0), n(0)]))
            .unwrap();

        assert_eq!(phases(&graph), vec![0, 1]);
        assert_eq!(graph.node(TaskId::from_index(1)).dependency_count(), 1);
    }

    #[test]
    fn dependency_through_several_edges_is_recorded_once() {
        // Triangle: node 1 shares two edges' worth of directions with node 0.
        let model = AdjacencyModel::from_edges(3, &[(0, 1), (1, 2), (0, 2)]).unwrap();
        let graph = GraphBuilder::new(&model)
            .build(&Schedule::flooding([n(0), n(1)]))
            .unwrap();

        let second = graph.node(TaskId::from_index(1));
        assert_eq!(second.dependency_count(), 1);
        assert_eq!(graph.node(TaskId::from_index(0)).dependents().len(), 1);
    }

    #[test]
    fn edge_update_ignores_its_own_output_input() {
        // Star around 1: edge update 1 -> 0 reads 2->1 only.
        let model = AdjacencyModel::from_edges(3, &[(1, 0), (1, 2)]).unwrap();
        let schedule = Schedule::Fixed(vec![
            UpdateTask::Edge { node: n(0), port: 0 }, // writes 0->1
            UpdateTask::Edge { node: n(1), port: 0 }, // writes 1->0, reads 2->1
        ]);
        let graph = GraphBuilder::new(&model).build(&schedule).unwrap();

        // 0->1 is not an input of the second update, so they are independent.
        assert_eq!(phases(&graph), vec![0, 0]);
    }

    #[test]
    fn edge_update_waits_for_its_inputs() {
        let model = AdjacencyModel::from_edges(3, &[(1, 0), (1, 2)]).unwrap();
        let schedule = Schedule::Fixed(vec![
            UpdateTask::Edge { node: n(2), port: 0 }, // writes 2->1
            UpdateTask::Edge { node: n(1), port: 0 }, // reads 2->1
        ]);
        let graph = GraphBuilder::new(&model).build(&schedule).unwrap();
        assert_eq!(phases(&graph), vec![0, 1]);
    }

    #[test]
    fn composites_share_the_tracker() {
        let model = path(3);
        let schedule = Schedule::Fixed(vec![
            UpdateTask::Node(n(0)),
            UpdateTask::composite(vec![UpdateTask::Node(n(1)), UpdateTask::Node(n(2))]),
        ]);
        let graph = GraphBuilder::new(&model).build(&schedule).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(phases(&graph), vec![0, 1, 2]);
    }

    #[test]
    fn unrolled_iterations_are_ordered() {
        let model = path(3);
        let schedule = Schedule::flooding([n(0), n(2)]);
        let graph = GraphBuilder::new(&model).unroll(3).build(&schedule).unwrap();

        assert_eq!(graph.len(), 6);
        assert_eq!(graph.unrolled_iterations(), 3);
        for iteration in 1..3 {
            for position in 0..2 {
                let later = graph.node(TaskId::from_index(iteration * 2 + position));
                let earlier = TaskId::from_index((iteration - 1) * 2 + position);
                assert!(later.dependencies().contains(&earlier));
                assert!(later.phase() > graph.node(earlier).phase());
            }
        }
        graph.validate().unwrap();
    }

    #[test]
    fn unrolled_isolated_node_still_chains() {
        // No edges at all: only the cross-iteration link orders the copies.
        let model = AdjacencyModel::with_nodes(1);
        let graph = GraphBuilder::new(&model)
            .unroll(3)
            .build(&Schedule::flooding([n(0)]))
            .unwrap();
        assert_eq!(phases(&graph), vec![0, 1, 2]);
    }

    #[test]
    fn dynamic_schedule_fails_fast() {
        let model = path(2);
        let err = GraphBuilder::new(&model)
            .build(&Schedule::Dynamic {
                name: "gibbs-random".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnsupportedSchedule(_)));
    }

    #[test]
    fn unknown_node_and_bad_port_are_rejected() {
        let model = path(2);
        let err = GraphBuilder::new(&model)
            .build(&Schedule::flooding([n(7)]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownNode(node) if node == n(7)));

        let err = GraphBuilder::new(&model)
            .build(&Schedule::Fixed(vec![UpdateTask::Edge { node: n(0), port: 1 }]))
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidPort { port: 1, degree: 1, .. }
        ));
    }

    #[test]
    fn lock_slots_are_shared_per_target_node() {
        let model = path(2);
        let graph = GraphBuilder::new(&model)
            .build(&Schedule::flooding([n(0), n(1), n(0)]))
            .unwrap();
        assert_eq!(graph.node_lock_count(), 2);
        let first = graph.node(TaskId::from_index(0)).lock_slot();
        let third = graph.node(TaskId::from_index(2)).lock_slot();
        assert_eq!(first, third);
    }
}
