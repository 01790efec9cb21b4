//! # Conductor Performance Benchmarks
//!
//! Benchmarks for the parts of a decision cycle that run between two tracks.
//!
//! ## Benchmark Categories
//!
//! - **Sampler**: Weighted choice over candidate sets of different sizes
//! - **Aggregation**: Summing every chain's edges into candidate weights
//! - **Learning**: Committing a transition across several chains
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench sampler
//! cargo bench aggregation
//! ```

use conductor::{Attribute, Conductor, EngineConfig, TrackDescriptor, WeightFunction, WeightedSampler};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;
use tempfile::TempDir;

fn track(i: usize) -> TrackDescriptor {
    TrackDescriptor::new(
        &format!("Track {i:04}"),
        &format!("Album {}", i / 10),
        &format!("Artist {}", i / 20),
        Some(&format!("Genre {}", i % 7)),
    )
}

/// Engine with `tracks` tracks, four chains and a walk through the catalog
/// so every chain has edges to aggregate.
fn create_benchmark_engine(tracks: usize) -> Conductor {
    let config = EngineConfig {
        seed: Some(42),
        ..EngineConfig::default()
    };
    let mut conductor = Conductor::open_in_memory(config).expect("Failed to open engine");
    for attr in Attribute::ALL {
        conductor.init_chain(attr, attr).expect("Failed to register chain");
    }
    for i in 0..tracks {
        conductor.touch_track(&track(i)).expect("Failed to touch track");
    }
    for i in 0..tracks * 2 {
        let from = track(i % tracks);
        let to = track((i * 7 + 3) % tracks);
        conductor
            .record_transition(Some(&from), &to, false)
            .expect("Failed to record transition");
    }
    conductor
}

fn benchmark_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampler");

    for size in [10_i64, 100, 1_000, 10_000] {
        #[allow(clippy::cast_precision_loss)]
        let weights: BTreeMap<i64, f64> = (0..size).map(|i| (i, (i % 13) as f64 + 0.5)).collect();
        let mut sampler = WeightedSampler::seeded(1);
        group.bench_with_input(BenchmarkId::new("choose", size), &weights, |b, weights| {
            b.iter(|| sampler.choose(black_box(weights).iter().map(|(k, w)| (*k, *w))))
        });
    }

    for (name, function) in [
        ("exponential", WeightFunction::Exponential),
        ("conservative", WeightFunction::Conservative),
        ("eager", WeightFunction::Eager),
    ] {
        group.bench_function(BenchmarkId::new("weight_function", name), |b| {
            b.iter(|| function.weight(black_box(0.7), black_box(2.0), black_box(4)))
        });
    }

    group.finish();
}

fn benchmark_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    group.sample_size(20);

    for size in [50, 200, 1_000] {
        let mut conductor = create_benchmark_engine(size);
        let from = track(0);
        group.bench_with_input(BenchmarkId::new("compute_weights", size), &from, |b, from| {
            b.iter(|| conductor.get_transitions_from(Some(black_box(from))))
        });
        group.bench_with_input(BenchmarkId::new("choose_next_track", size), &from, |b, from| {
            b.iter(|| conductor.choose_next_track(Some(black_box(from))))
        });
    }

    group.finish();
}

fn benchmark_learning(c: &mut Criterion) {
    let mut group = c.benchmark_group("learning");
    group.sample_size(20);

    let mut conductor = create_benchmark_engine(200);
    let (a, b) = (track(1), track(2));
    group.bench_function("record_transition", |bench| {
        bench.iter(|| conductor.record_transition(Some(black_box(&a)), black_box(&b), false))
    });
    group.bench_function("record_feedback", |bench| {
        bench.iter(|| conductor.record_feedback(black_box(true)))
    });

    // File-backed store, reopened per batch, to include the on-disk commit.
    group.bench_function("record_transition_on_disk", |bench| {
        bench.iter_batched(
            || {
                let dir = TempDir::new().expect("Failed to create temp directory");
                let conductor = Conductor::open(&dir.path().join("bench.db"), EngineConfig::default())
                    .expect("Failed to open engine");
                (dir, conductor)
            },
            |(_dir, mut conductor)| conductor.record_transition(Some(&a), &b, false),
            BatchSize::PerIteration,
        )
    });

    group.finish();
}

criterion_group!(benches, benchmark_sampler, benchmark_aggregation, benchmark_learning);
criterion_main!(benches);
