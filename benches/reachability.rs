//! Performance benchmarks for closures and rank.
//!
//! Run with: `cargo bench --bench reachability`
//!
//! ## Workloads
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | Single closure | Seed with the largest reach |
//! | All closure sizes | Parallel over every populated id |
//! | Rank | Both directions, default policy |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

use registry_graph_kernel::{
    rank, Direction, Edge, EntityId, PeriodKey, RankPolicy, ReachabilitySolver, Snapshot,
};

/// Sparse random snapshot where every node depends on a few older ones,
/// like a registry where packages only depend on packages that exist.
fn make_snapshot(nodes: usize, avg_deps: usize) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(7);
    let mut edges = Vec::with_capacity(nodes * avg_deps);
    for row in 1..nodes {
        let deps = rng.gen_range(0..=avg_deps * 2);
        for _ in 0..deps {
            let target = rng.gen_range(0..row);
            edges.push(Edge::new(EntityId::from_index(row), EntityId::from_index(target)));
        }
    }
    let period = PeriodKey::parse("2020-01").unwrap();
    Snapshot::from_edges(period, nodes, nodes, edges)
}

/// Benchmark one full closure from the newest entity.
fn bench_closure(c: &mut Criterion) {
    let solver = ReachabilitySolver::new();
    let none = BTreeSet::new();
    let mut group = c.benchmark_group("closure");

    for nodes in [1_000, 10_000, 50_000] {
        let snapshot = make_snapshot(nodes, 4);
        let seed = EntityId::from_index(nodes - 1);

        group.throughput(Throughput::Elements(snapshot.edge_count() as u64));
        group.bench_with_input(BenchmarkId::new("nodes", nodes), &snapshot, |b, snapshot| {
            b.iter(|| solver.closure(black_box(snapshot), seed, &none))
        });
    }

    group.finish();
}

/// Benchmark closure sizes for every id.
fn bench_closure_sizes(c: &mut Criterion) {
    let solver = ReachabilitySolver::new();
    let mut group = c.benchmark_group("closure_sizes");
    group.sample_size(10);

    for nodes in [1_000, 5_000] {
        let snapshot = make_snapshot(nodes, 4);
        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_with_input(BenchmarkId::new("nodes", nodes), &snapshot, |b, snapshot| {
            b.iter(|| solver.closure_sizes(black_box(snapshot)))
        });
    }

    group.finish();
}

/// Benchmark rank in both directions.
fn bench_rank(c: &mut Criterion) {
    let policy = RankPolicy::default();
    let mut group = c.benchmark_group("rank");

    for nodes in [1_000, 10_000, 50_000] {
        let snapshot = make_snapshot(nodes, 4);
        for direction in Direction::ALL {
            group.throughput(Throughput::Elements(snapshot.edge_count() as u64));
            group.bench_with_input(
                BenchmarkId::new(direction.to_string(), nodes),
                &snapshot,
                |b, snapshot| b.iter(|| rank(black_box(snapshot), direction, &policy)),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_closure, bench_closure_sizes, bench_rank);
criterion_main!(benches);
