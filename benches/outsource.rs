use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use aspe_rknn::math::ScalarSampler;
use aspe_rknn::params::RknnParams;
use aspe_rknn::rknn::{outsource, precompute_distances};

fn grid(n: usize, dim: usize, stride: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..dim).map(|j| ((i * stride + j * 13) % 997) as f64 * 0.01).collect())
        .collect()
}

fn distance_benchmark(c: &mut Criterion) {
    let objects = grid(2_000, 2, 31);
    let reference = grid(2_000, 2, 17);

    let mut group = c.benchmark_group("precompute_distances");
    group.sample_size(10);

    for workers in [1, 2, 4, 8] {
        let params = RknnParams::with_parallelism(workers);
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, _| {
                b.iter(|| precompute_distances(&objects, &reference, &params).unwrap());
            },
        );
    }

    group.finish();
}

fn outsource_benchmark(c: &mut Criterion) {
    let params = RknnParams::default();
    let mut sampler = ScalarSampler::with_seed(params.scalar_min, params.scalar_max, 7).unwrap();

    let mut group = c.benchmark_group("outsource");
    group.sample_size(10);

    for dim in [2, 8, 32] {
        let objects = grid(1_000, dim, 31);
        let reference = grid(500, dim, 17);
        group.bench_with_input(BenchmarkId::new("dim", dim), &dim, |b, _| {
            b.iter(|| outsource(&objects, &reference, &params, &mut sampler).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, distance_benchmark, outsource_benchmark);
criterion_main!(benches);
