use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use openperf_wire::ethernet::{EthernetHeader, ETHERTYPE_IPV4};
use openperf_wire::ipv4::Ipv4Header;
use openperf_wire::signature::Signature;

fn criterion_benchmark(c: &mut Criterion) {
    let mut headers = c.benchmark_group("headers");
    headers.throughput(Throughput::Elements(1));

    headers.bench_function("ethernet_encode_decode", |bencher| {
        let header = EthernetHeader {
            destination: [1, 2, 3, 4, 5, 6],
            source: [6, 5, 4, 3, 2, 1],
            vlan_tags: Vec::new(),
            mpls_labels: Vec::new(),
            payload_ethertype: ETHERTYPE_IPV4,
        };

        bencher.iter(|| {
            let mut buf = BytesMut::new();
            header.encode(&mut buf);
            let mut cursor = &buf[..];
            EthernetHeader::decode(&mut cursor).unwrap()
        })
    });

    headers.bench_function("ipv4_checksum", |bencher| {
        let header = Ipv4Header {
            dscp: 0,
            ecn: 0,
            total_length: 1500,
            identification: 0,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 64,
            protocol: 6,
            source: "10.0.0.1".parse().unwrap(),
            destination: "10.0.0.2".parse().unwrap(),
        };

        bencher.iter(|| header.checksum())
    });

    headers.bench_function("signature_encode_decode", |bencher| {
        let signature = Signature { data: [0xab; 16], cheater: 1 };

        bencher.iter(|| {
            let mut buf = BytesMut::new();
            signature.encode(&mut buf);
            let mut cursor = &buf[..];
            Signature::decode(&mut cursor).unwrap()
        })
    });

    headers.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
