use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use openperf_arena::Arena;

fn criterion_benchmark(c: &mut Criterion) {
    let mut arena_criterion = c.benchmark_group("arena");

    arena_criterion.throughput(Throughput::Elements(1));
    arena_criterion.bench_function("reserve_release_128", |bencher| {
        let mut arena = Arena::new(1 << 20);

        bencher.iter(|| {
            let addr = arena.reserve(128).unwrap();
            arena.release(addr).unwrap();
        })
    });

    arena_criterion.bench_function("reserve_release_mixed_sizes", |bencher| {
        let mut arena = Arena::new(1 << 20);
        let sizes = [32usize, 128, 256, 1024, 64];

        bencher.iter(|| {
            let addrs: Vec<usize> = sizes.iter().map(|&n| arena.reserve(n).unwrap()).collect();

            for addr in addrs {
                arena.release(addr).unwrap();
            }
        })
    });

    arena_criterion.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
