//! Executor Configuration
//!
//! Options recognised by the execution engine and the scheduler manager.
//! Configurations can be built in code or loaded from JSON:
//!
//! ```json
//! {
//!     "worker-pool-size": 8,
//!     "strategy": "phase-barrier",
//!     "work-stealing": true,
//!     "unroll-cross-iteration-dependencies": false
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// How a dependency graph is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Run phase by phase with a barrier in between. Each phase is split into
    /// one contiguous shard per worker.
    PhaseBarrier,

    /// Run each task as soon as its dependencies finish, from one shared
    /// ready queue.
    #[default]
    DependencyDriven,

    /// Run every task on the calling thread in schedule order.
    Sequential,
}

/// Number of worker threads used when none is configured.
pub fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_true() -> bool {
    true
}

/// Engine and manager options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExecutorConfig {
    /// Worker threads in the pool. Must be positive.
    #[serde(default = "default_pool_size")]
    pub worker_pool_size: usize,

    pub strategy: ExecutionStrategy,

    /// Let idle workers take items from other shards. Only used by
    /// [`ExecutionStrategy::PhaseBarrier`].
    #[serde(default = "default_true")]
    pub work_stealing: bool,

    /// Build one graph with every requested iteration unrolled, instead of
    /// replaying a single-iteration graph.
    pub unroll_cross_iteration_dependencies: bool,

    /// Hold a per-node lock while a task's update runs.
    #[serde(default = "default_true")]
    pub node_locking: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_pool_size(),
            strategy: ExecutionStrategy::default(),
            work_stealing: true,
            unroll_cross_iteration_dependencies: false,
            node_locking: true,
        }
    }
}

impl ExecutorConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn with_work_stealing(mut self, enabled: bool) -> Self {
        self.work_stealing = enabled;
        self
    }

    pub fn with_unrolling(mut self, enabled: bool) -> Self {
        self.unroll_cross_iteration_dependencies = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker-pool-size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
