// Performance benchmarks for coercion, shuffles and ordered joins
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rvd::{
    row, DataType, Field, JoinType, Row, RowCollection, RowSchema, Rvd, RvdConfig, RvdContext,
};
use std::sync::Arc;

fn schema(value_name: &str) -> Arc<RowSchema> {
    Arc::new(
        RowSchema::new(
            vec![
                Field::new("contig", DataType::Int32),
                Field::new("pos", DataType::Int64),
                Field::new(value_name, DataType::Float64),
            ],
            2,
        )
        .unwrap(),
    )
}

/// Rows in `partitions` chunks. Sorted input yields disjoint sorted chunks,
/// otherwise keys are scattered across all chunks.
fn generate_partitions(rows: usize, partitions: usize, sorted: bool, seed: u64) -> Vec<Vec<Row>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keys: Vec<(i32, i64)> = (0..rows)
        .map(|_| (rng.random_range(1..23), rng.random_range(0..250_000_000)))
        .collect();
    if sorted {
        keys.sort_unstable();
    }
    let per = rows.div_ceil(partitions).max(1);
    keys.chunks(per)
        .map(|chunk| {
            chunk
                .iter()
                .map(|&(contig, pos)| row![contig, pos, rng.random::<f64>()])
                .collect()
        })
        .collect()
}

fn context() -> RvdContext {
    RvdContext::new(RvdConfig::default()).unwrap()
}

fn benchmark_coerce(c: &mut Criterion) {
    let mut group = c.benchmark_group("coerce");
    let ctx = context();

    for size in [1_000, 10_000, 100_000].iter() {
        let sorted = RowCollection::new(generate_partitions(*size, 16, true, 1));
        group.bench_with_input(BenchmarkId::new("as_is", size), &sorted, |b, rows| {
            b.iter(|| Rvd::coerce(&ctx, schema("qual"), 1, black_box(rows.clone())).unwrap());
        });

        let unsorted = RowCollection::new(generate_partitions(*size, 16, false, 2));
        group.bench_with_input(BenchmarkId::new("shuffle", size), &unsorted, |b, rows| {
            b.iter(|| Rvd::coerce(&ctx, schema("qual"), 1, black_box(rows.clone())).unwrap());
        });
    }

    group.finish();
}

fn benchmark_coalesce(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesce");
    let ctx = context();
    let rvd = Rvd::from_partitions(&ctx, schema("qual"), 2, generate_partitions(100_000, 256, true, 3))
        .unwrap();

    for target in [4, 32, 128].iter() {
        group.bench_with_input(BenchmarkId::new("balanced", target), target, |b, &target| {
            b.iter(|| rvd.coalesce(&ctx, black_box(target)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("naive", target), target, |b, &target| {
            b.iter(|| rvd.naive_coalesce(&ctx, black_box(target)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");
    let ctx = context();

    for size in [1_000, 10_000, 100_000].iter() {
        let left = Rvd::from_partitions(&ctx, schema("qual"), 1, generate_partitions(*size, 8, true, 4))
            .unwrap();
        let right = Rvd::from_partitions(&ctx, schema("score"), 1, generate_partitions(*size, 12, true, 5))
            .unwrap();

        group.bench_with_input(BenchmarkId::new("inner", size), size, |b, _| {
            b.iter(|| left.ordered_join(&ctx, &right, 2, JoinType::Inner).unwrap().count());
        });
        group.bench_with_input(BenchmarkId::new("zip", size), size, |b, _| {
            b.iter(|| left.ordered_zip_join(&ctx, &right, 2).unwrap().count());
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_coerce, benchmark_coalesce, benchmark_join);
criterion_main!(benches);
