use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use openperf_generator::template::{FieldModifier, Modifier, PacketTemplate, ProtocolTemplate, Tie};

fn udp_flood_template() -> PacketTemplate {
    PacketTemplate {
        tie: Tie::Cartesian,
        protocols: vec![ProtocolTemplate {
            base: vec![0u8; 14],
            fields: vec![FieldModifier {
                offset: 0,
                width: 4,
                modifier: Modifier::Sequence { start: 0, stop: 255, skip: 1, width: 4 },
            }],
            tie: Tie::Zip,
        }],
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("expansion");
    let template = udp_flood_template();

    group.throughput(Throughput::Elements(template.expansion_len().unwrap() as u64));
    group.bench_function("expand_256_flows", |bencher| {
        bencher.iter(|| template.expand().unwrap());
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
