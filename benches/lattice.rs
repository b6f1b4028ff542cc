//! Criterion benchmarks for the phase lattice.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use phase_lattice::bias::BiasField;
use phase_lattice::config::LatticeConfig;
use phase_lattice::lattice::ExecutionTier;
use phase_lattice::metrics::{FieldStats, MetricField, MetricsCollector};
use phase_lattice::session::Session;
use phase_lattice::sources::RandomPulses;
use phase_lattice::topology::{Neighborhood, Topology};

fn make_session(size: usize, tier: ExecutionTier, seed: u64) -> Session {
    let cfg = LatticeConfig::with_size(size)
        .with_seed(seed)
        .with_execution_tier(tier);
    Session::new(cfg).unwrap().with_source(Box::new(RandomPulses {
        every: 8,
        ..Default::default()
    }))
}

/// Benchmark tick() with varying grid sizes.
fn bench_tick_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_size");

    for size in [8usize, 16, 24, 32].iter() {
        group.throughput(Throughput::Elements((size * size * size) as u64));

        group.bench_with_input(BenchmarkId::new("scalar", size), size, |b, &size| {
            let mut session = make_session(size, ExecutionTier::Scalar, 42);
            b.iter(|| black_box(session.tick().energy));
        });
    }

    group.finish();
}

/// Benchmark tick() comparing execution tiers at a fixed size.
fn bench_tick_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_tier");

    let size = 32;
    group.throughput(Throughput::Elements((size * size * size) as u64));

    group.bench_function("scalar_32", |b| {
        let mut session = make_session(size, ExecutionTier::Scalar, 42);
        b.iter(|| black_box(session.tick().energy));
    });

    // Parallel (falls back to scalar if feature not enabled)
    group.bench_function("parallel_32", |b| {
        let mut session = make_session(size, ExecutionTier::Parallel, 42);
        b.iter(|| black_box(session.tick().energy));
    });

    group.finish();
}

/// Benchmark the bias field on its own.
fn bench_bias(c: &mut Criterion) {
    let mut group = c.benchmark_group("bias");

    for size in [16usize, 32].iter() {
        let cfg = LatticeConfig::with_size(*size).bias;

        group.bench_with_input(BenchmarkId::new("decay_diffuse", size), size, |b, &size| {
            let mut field = BiasField::new(size, cfg).unwrap();
            b.iter(|| {
                field.inject_pulse([0, 0, 0], 0.2, 3.0);
                field.decay();
                black_box(field.average_magnitude())
            });
        });

        group.bench_with_input(BenchmarkId::new("inject_r3", size), size, |b, &size| {
            let mut field = BiasField::new(size, cfg).unwrap();
            let s = size as i64;
            let mut t = 0i64;
            b.iter(|| {
                t += 1;
                black_box(field.inject_pulse([t % s, (t * 3) % s, (t * 7) % s], 0.01, 3.0))
            });
        });
    }

    group.finish();
}

/// Benchmark metric reductions under both stencils.
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");
    let size = 32;

    for nbhd in [Neighborhood::VonNeumann, Neighborhood::Moore] {
        let topo = Topology::new(size, nbhd).unwrap();
        let values: Vec<f32> = (0..topo.cell_count())
            .map(|i| (i as f32 * 0.37).sin().abs())
            .collect();
        group.bench_function(format!("reduce_{nbhd:?}"), |b| {
            b.iter(|| black_box(FieldStats::reduce(&values, &topo).coherence));
        });
    }

    let session = make_session(size, ExecutionTier::Scalar, 7);
    let collector =
        MetricsCollector::new(MetricField::Plasma, Some(Neighborhood::Moore), size).unwrap();
    group.bench_function("sample_moore", |b| {
        b.iter(|| black_box(collector.sample(session.lattice(), session.bias()).dispersion));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tick_sizes,
    bench_tick_tiers,
    bench_bias,
    bench_metrics
);
criterion_main!(benches);
