//! Factorflow Core
//!
//! This crate schedules and executes the update tasks of iterative
//! message-passing inference on a factor graph. It implements:
//!
//! - Dependency discovery between the tasks of a fixed update schedule
//! - Phase leveling, so independent tasks can run side by side
//! - Parallel replay of one dependency graph across many iterations
//! - Caching of graphs per model version and schedule
//!
//! The crate never decides the logical update order or does any numeric
//! work itself. Both come from outside: the order as a [`Schedule`], the
//! numeric work through the [`Model`] trait.
//!
//! # Architecture
//!
//! - `task`: update tasks and schedules
//! - `model`: the model boundary and an in-memory reference model
//! - `graph`: dependency graph construction, validation and export
//! - `exec`: worker pool and execution strategies
//! - `manager`: graph cache and `iterate` entry point
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use factorflow_core::{
//!     AdjacencyModel, ExecutionEngine, ExecutorConfig, NodeId, Schedule, SchedulerManager,
//! };
//!
//! # fn main() -> factorflow_core::Result<()> {
//! let model = Arc::new(AdjacencyModel::from_edges(3, &[(0, 1), (1, 2)])?);
//! let schedule = Schedule::flooding((0..3).map(NodeId::new));
//!
//! let engine = ExecutionEngine::with_config(ExecutorConfig::default().with_pool_size(2))?;
//! let mut manager = SchedulerManager::new(engine);
//! manager.iterate(&model, &schedule, 10)?;
//!
//! assert_eq!(model.update_count(NodeId::new(1)), 10);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod manager;
pub mod model;
pub mod task;

pub use config::{ExecutionStrategy, ExecutorConfig};
pub use error::{Result, SchedulerError, TaskError};
pub use exec::{CancellationToken, ExecutionEngine, WorkerPool};
pub use graph::{DependencyGraph, DependencyNode, EdgeTouchTracker, GraphBuilder, TaskId};
pub use manager::SchedulerManager;
pub use model::{AdjacencyModel, DirectedEdge, Model, NodeId};
pub use task::{LeafTask, Schedule, TaskKind, UpdateTask};
