use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use raglet::index::VectorIndex;

const DIMENSIONS: usize = 384;
const TOP_K: usize = 10;

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(std::time::Duration::from_secs(10))
        .configure_from_args()
}

fn random_index(count: usize, rng: &mut StdRng) -> VectorIndex {
    let vectors: Vec<Vec<f32>> = (0..count)
        .map(|_| (0..DIMENSIONS).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let mut index = VectorIndex::new();
    index.insert(&vectors).unwrap();
    index
}

fn search_benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut group = c.benchmark_group("exact_search");

    for &count in &[100usize, 1000, 5000] {
        let index = random_index(count, &mut rng);
        let query: Vec<f32> = (0..DIMENSIONS).map(|_| rng.gen_range(-1.0..1.0)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| index.search(&query, TOP_K).unwrap())
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = search_benchmark
}
criterion_main!(benches);
