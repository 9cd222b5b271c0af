use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use fib::Directory;
use openperf_runtime::{Frame, RxDispatcher, StackInput};

struct NullStack;

impl StackInput for NullStack {
    fn input(&self, _interface: fib::InterfaceId, _frame: Vec<u8>) {}
}

fn burst(n: usize) -> Vec<Frame> {
    (0..n)
        .map(|i| {
            let mut data = vec![0u8; 256];
            data[5] = i as u8;
            Frame {
                data,
                generator_tagged: false,
            }
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rx_dispatch");
    group.throughput(Throughput::Elements(32));

    group.bench_function("unresolved_burst_of_32", |bencher| {
        let directory = Arc::new(Directory::new());
        directory.publish(directory.edit());
        let dispatcher = RxDispatcher {
            port: 0,
            directory,
            stack: Arc::new(NullStack),
        };

        bencher.iter(|| dispatcher.dispatch_burst(burst(32)));
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
