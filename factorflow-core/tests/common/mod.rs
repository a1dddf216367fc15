//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use factorflow_core::{
    AdjacencyModel, CancellationToken, DependencyGraph, DirectedEdge, ExecutionEngine,
    ExecutionStrategy, ExecutorConfig, GraphBuilder, LeafTask, Model, NodeId, Schedule,
    TaskError, UpdateTask,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

pub type Messages = Vec<(DirectedEdge, f64)>;

pub fn engine(strategy: ExecutionStrategy, workers: usize) -> ExecutionEngine {
    ExecutionEngine::with_config(
        ExecutorConfig::default()
            .with_strategy(strategy)
            .with_pool_size(workers),
    )
    .unwrap()
}

pub fn engine_with(config: ExecutorConfig) -> ExecutionEngine {
    ExecutionEngine::with_config(config).unwrap()
}

pub fn path_edges(n: u32) -> Vec<(u32, u32)> {
    (1..n).map(|i| (i - 1, i)).collect()
}

/// Undirected edges of a random simple graph over `nodes` nodes.
pub fn random_edges(rng: &mut StdRng, nodes: u32, density: f64) -> Vec<(u32, u32)> {
    let mut edges = Vec::new();
    for a in 0..nodes {
        for b in (a + 1)..nodes {
            if rng.gen_bool(density) {
                edges.push((a, b));
            }
        }
    }
    edges
}

/// A random fixed schedule mixing node updates, edge updates and composites.
pub fn random_schedule(rng: &mut StdRng, model: &AdjacencyModel, len: usize) -> Schedule {
    let nodes = model.node_count() as u32;
    let leaf = |rng: &mut StdRng| {
        let node = NodeId::new(rng.gen_range(0..nodes));
        let degree = model.neighbors(node).map_or(0, <[NodeId]>::len);
        if degree > 0 && rng.gen_bool(0.4) {
            UpdateTask::Edge {
                node,
                port: rng.gen_range(0..degree),
            }
        } else {
            UpdateTask::Node(node)
        }
    };

    let mut tasks = Vec::with_capacity(len);
    while tasks.len() < len {
        if rng.gen_bool(0.1) {
            let children = (0..rng.gen_range(1..4)).map(|_| leaf(rng)).collect();
            tasks.push(UpdateTask::composite(children));
        } else {
            tasks.push(leaf(rng));
        }
    }
    Schedule::Fixed(tasks)
}

/// Every node once, in random order.
pub fn shuffled_flooding(rng: &mut StdRng, nodes: u32) -> Schedule {
    let mut order: Vec<_> = (0..nodes).map(NodeId::new).collect();
    order.shuffle(rng);
    Schedule::flooding(order)
}

/// Final messages after running `schedule` `iterations` times on the calling
/// thread, one task after another.
pub fn sequential_messages(
    nodes: usize,
    edges: &[(u32, u32)],
    schedule: &Schedule,
    iterations: usize,
) -> Messages {
    let model = AdjacencyModel::from_edges(nodes, edges).unwrap();
    let leaves = schedule.flatten().unwrap();
    for _ in 0..iterations {
        for &leaf in &leaves {
            model.execute(leaf).unwrap();
        }
    }
    model.messages()
}

/// Final messages after running `schedule` through `engine`.
pub fn engine_messages(
    engine: &ExecutionEngine,
    nodes: usize,
    edges: &[(u32, u32)],
    schedule: &Schedule,
    iterations: usize,
) -> Messages {
    let model = Arc::new(AdjacencyModel::from_edges(nodes, edges).unwrap());
    let graph = build(&*model, schedule);
    engine
        .iterate(&graph, &model, iterations, &CancellationToken::new())
        .unwrap();
    model.messages()
}

pub fn build<M: Model + ?Sized>(model: &M, schedule: &Schedule) -> Arc<DependencyGraph> {
    Arc::new(GraphBuilder::new(model).build(schedule).unwrap())
}

/// Wraps a model and fails the first update of one node.
pub struct FailOnce {
    pub inner: AdjacencyModel,
    pub target: LeafTask,
    armed: AtomicBool,
}

impl FailOnce {
    pub fn new(inner: AdjacencyModel, target: LeafTask) -> Self {
        Self {
            inner,
            target,
            armed: AtomicBool::new(true),
        }
    }
}

impl Model for FailOnce {
    fn version(&self) -> u64 {
        self.inner.version()
    }

    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.inner.neighbors(node)
    }

    fn execute(&self, task: LeafTask) -> Result<(), TaskError> {
        if task == self.target && self.armed.swap(false, Ordering::SeqCst) {
            return Err(format!("update of {task} diverged").into());
        }
        self.inner.execute(task)
    }
}

/// Wraps a model and panics whenever one node is updated.
pub struct Panicking {
    pub inner: AdjacencyModel,
    pub target: NodeId,
}

impl Model for Panicking {
    fn version(&self) -> u64 {
        self.inner.version()
    }

    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.inner.neighbors(node)
    }

    fn execute(&self, task: LeafTask) -> Result<(), TaskError> {
        if task.node() == self.target {
            panic!("non-finite message at {}", self.target);
        }
        self.inner.execute(task)
    }
}

/// Wraps a model and fires a cancellation token after one node is updated.
pub struct CancelAfter {
    pub inner: AdjacencyModel,
    pub target: NodeId,
    pub token: CancellationToken,
}

impl Model for CancelAfter {
    fn version(&self) -> u64 {
        self.inner.version()
    }

    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.inner.neighbors(node)
    }

    fn execute(&self, task: LeafTask) -> Result<(), TaskError> {
        self.inner.execute(task)?;
        if task.node() == self.target {
            self.token.cancel();
        }
        Ok(())
    }
}
