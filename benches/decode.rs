use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nas_searchspace::prelude::*;
use ndarray::Array4;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

fn random_tokens(space: &dyn SearchSpace, n: usize) -> Vec<Vec<usize>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let table = space.range_table();

    (0..n)
        .map(|_| table.iter().map(|&bound| rng.gen_range(0..bound)).collect())
        .collect()
}

fn bench_token2arch(c: &mut Criterion) {
    let mut group = c.benchmark_group("token2arch");

    for block_num in [1, 3, 6].iter() {
        let space = MobileNetV2Space::with_sizes(224, 1, *block_num).unwrap();
        let candidates = random_tokens(&space, 64);

        group.bench_with_input(
            BenchmarkId::new("decode", block_num),
            &candidates,
            |b, candidates| {
                b.iter(|| {
                    for tokens in candidates {
                        black_box(space.token2arch(Some(tokens.as_slice())).unwrap());
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_symbolic_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("symbolic_build");

    for input_size in [32, 224].iter() {
        let space = MobileNetV2Space::with_sizes(*input_size, 1, 6).unwrap();
        let arch = space.token2arch(None).unwrap();

        group.bench_with_input(BenchmarkId::new("build", input_size), &arch, |b, arch| {
            b.iter(|| {
                let mut graph = ShapeGraph::new();
                let x = graph.input(&[1, 3, *input_size, *input_size]);
                black_box(arch.build(&mut graph, &x).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_eager_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_forward");
    group.sample_size(10); // Naive convolutions are slow

    let config = SearchSpaceConfig::new(32, 1, 3)
        .with_scale(0.25)
        .with_class_dim(10);
    let space = MobileNetV2Space::new(config).unwrap();
    let arch = space.token2arch(None).unwrap();
    let input = Array4::<f32>::ones((1, 3, 32, 32)).into_dyn();

    group.bench_function("mobilenet_v2_32px", |b| {
        b.iter(|| {
            let mut graph = EagerGraph::new(0);
            black_box(arch.build(&mut graph, &input).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_token2arch, bench_symbolic_build, bench_eager_forward);
criterion_main!(benches);
