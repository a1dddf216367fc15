//! Scheduler Manager
//!
//! Entry point that ties graph construction and execution together.
//!
//! # Caching
//!
//! Building a graph walks the whole schedule, so the manager keeps the last
//! graph it built together with the model version and the schedule it was
//! built from. The graph is reused as long as both are unchanged, and
//! rebuilt the first time either differs. [`SchedulerManager::invalidate`]
//! forces a rebuild for models that change without bumping their version.
//!
//! With cross-iteration unrolling enabled, the number of requested
//! iterations is part of the cache key, because it decides how many copies
//! of the schedule the graph contains.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::exec::{CancellationToken, ExecutionEngine};
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::model::Model;
use crate::task::Schedule;

struct CachedGraph {
    version: u64,
    schedule: Schedule,
    unrolled: usize,
    graph: Arc<DependencyGraph>,
}

/// Builds, caches and executes dependency graphs.
pub struct SchedulerManager {
    engine: ExecutionEngine,
    cache: Option<CachedGraph>,
    builds: usize,
}

impl SchedulerManager {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            engine,
            cache: None,
            builds: 0,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Mutable access to the engine, e.g. to switch strategy or resize the
    /// pool. Cached graphs stay valid.
    pub fn engine_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.engine
    }

    /// Number of graphs built so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Drop the cached graph.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// The single-iteration graph for `schedule` over the model's current
    /// version, built on first use.
    pub fn graph<M>(&mut self, model: &M, schedule: &Schedule) -> Result<Arc<DependencyGraph>>
    where
        M: Model + ?Sized,
    {
        self.graph_for(model, schedule, 1)
    }

    fn graph_for<M>(
        &mut self,
        model: &M,
        schedule: &Schedule,
        unrolled: usize,
    ) -> Result<Arc<DependencyGraph>>
    where
        M: Model + ?Sized,
    {
        let version = model.version();
        if let Some(cached) = &self.cache {
            if cached.version == version
                && cached.unrolled == unrolled
                && cached.schedule == *schedule
            {
                return Ok(Arc::clone(&cached.graph));
            }
        }

        // Build before touching the cache so a failed build keeps the old graph.
        let graph = Arc::new(GraphBuilder::new(model).unroll(unrolled).build(schedule)?);
        self.builds += 1;
        debug!(version, unrolled, builds = self.builds, "cached new dependency graph");

        self.cache = Some(CachedGraph {
            version,
            schedule: schedule.clone(),
            unrolled,
            graph: Arc::clone(&graph),
        });
        Ok(graph)
    }

    /// Run `iterations` iterations of `schedule` over `model`.
    pub fn iterate<M>(&mut self, model: &Arc<M>, schedule: &Schedule, iterations: usize) -> Result<()>
    where
        M: Model + ?Sized,
    {
        self.iterate_with_cancel(model, schedule, iterations, &CancellationToken::new())
    }

    /// Like [`iterate`](Self::iterate), stopping early once `cancel` fires.
    pub fn iterate_with_cancel<M>(
        &mut self,
        model: &Arc<M>,
        schedule: &Schedule,
        iterations: usize,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        M: Model + ?Sized,
    {
        if iterations == 0 {
            return Ok(());
        }

        if self.engine.config().unroll_cross_iteration_dependencies {
            let graph = self.graph_for(&**model, schedule, iterations)?;
            self.engine.iterate(&graph, model, 1, cancel)
        } else {
            let graph = self.graph_for(&**model, schedule, 1)?;
            self.engine.iterate(&graph, model, iterations, cancel)
        }
    }
}

impl std::fmt::Debug for SchedulerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerManager")
            .field("engine", &self.engine)
            .field("cached_version", &self.cache.as_ref().map(|c| c.version))
            .field("builds", &self.builds)
            .finish()
    }
}
