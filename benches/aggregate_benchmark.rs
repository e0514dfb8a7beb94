//! Benchmark for normalization and binned aggregation on synthetic observations
//!
//! Run with: cargo bench --bench aggregate_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use faer::Mat;
use polars::prelude::*;
use rand::prelude::*;
use rand::SeedableRng;

use ordbin::pipeline::{
    aggregate, normalize, reshape_predictions, Dimension, Field, NormalizeOptions,
};

/// Generate `n_groups` groups of 2-8 individuals, each ranked in `n_tests` tests
fn generate_observations(n_groups: usize, n_tests: usize, seed: u64) -> DataFrame {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let mut group_ids = Vec::new();
    let mut test_ids = Vec::new();
    let mut individual_ids = Vec::new();
    let mut statuses = Vec::new();
    let mut arrival_orders = Vec::new();
    let mut foraging = Vec::new();
    let mut group_sizes = Vec::new();

    for g in 0..n_groups {
        let size: i64 = rng.gen_range(2..=8);
        for t in 0..n_tests {
            let mut ranks: Vec<i64> = (1..=size).collect();
            ranks.shuffle(&mut rng);
            for (i, rank) in ranks.into_iter().enumerate() {
                group_ids.push(format!("G{}", g));
                test_ids.push(format!("T{}", t));
                individual_ids.push(format!("G{}_{}", g, i));
                // Dominant individuals tend to arrive early
                statuses.push(if rank <= size / 2 { "Dom" } else { "Sub" });
                arrival_orders.push(rank);
                foraging.push(rng.gen::<f64>());
                group_sizes.push(size);
            }
        }
    }

    df! {
        "group_id" => group_ids,
        "test_id" => test_ids,
        "individual_id" => individual_ids,
        "status" => statuses,
        "arrival_order" => arrival_orders,
        "foraging_success" => foraging,
        "group_size" => group_sizes,
    }
    .expect("Failed to create DataFrame")
}

/// Benchmark schema normalization for varying table sizes
fn benchmark_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for n_groups in [100, 1_000, 5_000] {
        let df = generate_observations(n_groups, 10, 42);
        group.throughput(Throughput::Elements(df.height() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(df.height()), &df, |b, df| {
            b.iter(|| {
                let _ = normalize(black_box(df), black_box(&NormalizeOptions::default()));
            });
        });
    }

    group.finish();
}

/// Benchmark one- and two-dimensional aggregation
fn benchmark_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for n_groups in [100, 1_000, 5_000] {
        let df = generate_observations(n_groups, 10, 42);
        let table = normalize(&df, &NormalizeOptions::default()).expect("valid observations");
        group.throughput(Throughput::Elements(table.len() as u64));

        let by_status = [Dimension::categorical(Field::Status)];
        group.bench_with_input(
            BenchmarkId::new("status", table.len()),
            &table,
            |b, table| {
                b.iter(|| {
                    let _ = aggregate(
                        black_box(table),
                        black_box(&by_status),
                        black_box(Field::ArrivalOrder),
                    );
                });
            },
        );

        let by_status_and_success = [
            Dimension::categorical(Field::Status),
            Dimension::continuous(Field::ForagingSuccess, 0.1),
        ];
        group.bench_with_input(
            BenchmarkId::new("status_x_success", table.len()),
            &table,
            |b, table| {
                b.iter(|| {
                    let _ = aggregate(
                        black_box(table),
                        black_box(&by_status_and_success),
                        black_box(Field::ArrivalOrderPercentileBin),
                    );
                });
            },
        );
    }

    group.finish();
}

/// Benchmark reshaping a wide prediction matrix into a long-form frame
fn benchmark_reshape(c: &mut Criterion) {
    let mut group = c.benchmark_group("reshape");
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);

    for n_rows in [1_000, 10_000] {
        let newdata = df! {
            "foraging_success" => (0..n_rows).map(|i| i as f64 / n_rows as f64).collect::<Vec<_>>(),
        }
        .expect("Failed to create DataFrame");
        let labels: Vec<String> = (1..=8).map(|k| k.to_string()).collect();
        let matrix = Mat::from_fn(n_rows, labels.len(), |_, _| rng.gen::<f64>());
        group.throughput(Throughput::Elements((n_rows * labels.len()) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &matrix, |b, m| {
            b.iter(|| {
                let long = reshape_predictions(black_box(&newdata), black_box(m), &labels);
                let _ = long.map(|l| l.to_dataframe());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_normalize,
    benchmark_aggregate,
    benchmark_reshape
);
criterion_main!(benches);
