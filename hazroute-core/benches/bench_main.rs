//! Optimisation throughput on synthetic grids.
//!
//! Run with: cargo bench -p hazroute_core --bench bench_main

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hazroute_core::{
    EngineConfig, RoutingEngine,
    loading::{GridSpec, grid_network},
    model::{HazardType, HazardZone, OptimizationRequest, Severity},
};
use petgraph::graph::NodeIndex;

fn engine(size: usize) -> RoutingEngine {
    let graph = grid_network(&GridSpec {
        rows: size,
        cols: size,
        relief: 40.0,
        arterial_every: Some(5),
        ..GridSpec::default()
    })
    .expect("grid network");
    // Zero TTL keeps every call a cache miss
    let config = EngineConfig {
        cache_ttl_secs: 0,
        ..EngineConfig::default()
    };
    RoutingEngine::new(graph, config).expect("engine")
}

fn corner_to_corner(engine: &RoutingEngine, size: usize) -> OptimizationRequest {
    let at = |idx: usize| engine.graph().node(NodeIndex::new(idx)).expect("node").geometry;
    OptimizationRequest::new(at(0), at(size * size - 1))
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_route");
    group.sample_size(20);

    for size in [10, 30, 60] {
        let engine = engine(size);
        let request = corner_to_corner(&engine, size);
        group.bench_with_input(BenchmarkId::new("open", size), &request, |b, request| {
            b.iter(|| black_box(engine.optimize_route(black_box(request))));
        });

        let center = engine
            .graph()
            .node(NodeIndex::new(size * size / 2 + size / 2))
            .expect("node")
            .geometry;
        engine.add_hazard_zone(HazardZone::circular(
            "bench",
            HazardType::Fire,
            center,
            size as f64 * 15.0,
            Severity::High,
        ));
        group.bench_with_input(BenchmarkId::new("hazard", size), &request, |b, request| {
            b.iter(|| black_box(engine.optimize_route(black_box(request))));
        });
    }

    group.finish();
}

fn bench_cached(c: &mut Criterion) {
    let graph = grid_network(&GridSpec {
        rows: 30,
        cols: 30,
        ..GridSpec::default()
    })
    .expect("grid network");
    let engine = RoutingEngine::new(graph, EngineConfig::default()).expect("engine");
    let request = corner_to_corner(&engine, 30);
    engine.optimize_route(&request);

    c.bench_function("optimize_route_cached", |b| {
        b.iter(|| black_box(engine.optimize_route(black_box(&request))));
    });
}

criterion_group!(benches, bench_optimize, bench_cached);
criterion_main!(benches);
