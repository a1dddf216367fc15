//! Iteration throughput per execution strategy.
//!
//! Measures one `iterate` call over a grid-shaped model with a flooding
//! schedule, for:
//! - the sequential baseline
//! - the phase-barrier strategy with and without work stealing
//! - the dependency-driven strategy

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use factorflow_core::{
    AdjacencyModel, CancellationToken, ExecutionEngine, ExecutionStrategy, ExecutorConfig,
    GraphBuilder, NodeId, Schedule,
};

/// `side` x `side` grid with four-neighbour connectivity.
fn grid(side: u32) -> AdjacencyModel {
    let mut edges = Vec::new();
    for row in 0..side {
        for col in 0..side {
            let id = row * side + col;
            if col + 1 < side {
                edges.push((id, id + 1));
            }
            if row + 1 < side {
                edges.push((id, id + side));
            }
        }
    }
    AdjacencyModel::from_edges((side * side) as usize, &edges).expect("grid edges are valid")
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    let side = 48;
    let model = Arc::new(grid(side));
    let schedule = Schedule::flooding((0..side * side).map(NodeId::new));
    let graph = Arc::new(
        GraphBuilder::new(&*model)
            .build(&schedule)
            .expect("flooding schedule builds"),
    );
    let cancel = CancellationToken::new();

    group.throughput(Throughput::Elements(graph.len() as u64));

    let cases = [
        ("sequential", ExecutionStrategy::Sequential, false),
        ("phase-barrier", ExecutionStrategy::PhaseBarrier, false),
        ("phase-barrier-stealing", ExecutionStrategy::PhaseBarrier, true),
        ("dependency-driven", ExecutionStrategy::DependencyDriven, false),
    ];

    for workers in [1, 4, 8] {
        for (name, strategy, stealing) in cases {
            let config = ExecutorConfig::default()
                .with_strategy(strategy)
                .with_work_stealing(stealing)
                .with_pool_size(workers);
            let engine = ExecutionEngine::with_config(config).expect("pool starts");

            group.bench_with_input(BenchmarkId::new(name, workers), &workers, |b, _| {
                b.iter(|| {
                    engine
                        .iterate(black_box(&graph), &model, 1, &cancel)
                        .expect("iteration succeeds")
                })
            });
        }
    }

    group.finish();
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for side in [16, 32, 64] {
        let model = grid(side);
        let schedule = Schedule::flooding((0..side * side).map(NodeId::new));
        group.throughput(Throughput::Elements(u64::from(side * side)));
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, _| {
            b.iter(|| {
                GraphBuilder::new(black_box(&model))
                    .build(&schedule)
                    .expect("flooding schedule builds")
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_graph_build);
criterion_main!(benches);
