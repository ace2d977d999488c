use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use cgan_fid::fid::{frechet_distance, sqrtm, GaussianSummary, DEFAULT_EPS};

fn make_embeddings(n: usize, d: usize, shift: f64, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut x = Array2::<f64>::zeros((n, d));
    for i in 0..n {
        for k in 0..d {
            let z: f64 = StandardNormal.sample(&mut rng);
            x[[i, k]] = z + shift;
        }
    }
    x
}

fn bench_frechet(c: &mut Criterion) {
    let mut group = c.benchmark_group("frechet");
    group.sample_size(20);

    for &(n, d) in &[(64usize, 16usize), (128, 64), (256, 128)] {
        let s1 = GaussianSummary::from_embeddings(&make_embeddings(n, d, 0.0, 1).view()).unwrap();
        let s2 = GaussianSummary::from_embeddings(&make_embeddings(n, d, 0.5, 2).view()).unwrap();
        let prod = s1.cov.dot(&s2.cov);

        group.bench_with_input(BenchmarkId::new("sqrtm", format!("d{d}")), &d, |b, _| {
            b.iter(|| sqrtm(&prod).unwrap())
        });

        group.bench_with_input(
            BenchmarkId::new("frechet_distance", format!("n{n}_d{d}")),
            &(n, d),
            |b, _| b.iter(|| frechet_distance(&s1, &s2, DEFAULT_EPS).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_frechet);
criterion_main!(benches);
