//! Request/reply latency through the real Unix control socket (spec
//! §4.6): one client connection, a socket opened once during setup,
//! then a `getsockopt` round trip benchmarked per iteration — the
//! same codec + transport path `crates/session/src/server.rs` runs in
//! production, not a direct `Handler` call.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use arena::Arena;
use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use netstack::{LoopbackStack, StackThread};
use parking_lot::Mutex;
use session::codec;
use session::wire::{Domain, OptLevel, OptName, Reply, Request, SockKind};

const MAX_MESSAGE_LEN: usize = 256;

fn call(stream: &mut UnixStream, request: &Request) -> Reply {
    let mut buf = BytesMut::with_capacity(MAX_MESSAGE_LEN);
    codec::encode_request(request, &mut buf);
    stream.write_all(&buf).expect("write request");

    let mut reply_buf = vec![0u8; MAX_MESSAGE_LEN];
    let n = stream.read(&mut reply_buf).expect("read reply");
    let mut cursor = bytes::Bytes::copy_from_slice(&reply_buf[..n]);
    codec::decode_reply(&mut cursor).expect("decode reply")
}

fn criterion_benchmark(c: &mut Criterion) {
    let path = std::env::temp_dir().join(format!("openperf-bench-server-{}.sock", std::process::id()));
    let arena = Arc::new(Mutex::new(Arena::new(4 << 20)));
    let (_stack_thread, stack_handle) = StackThread::spawn(Box::new(LoopbackStack::new()));

    let server = session::Server::bind(&path, arena, stack_handle).expect("bind control socket");
    std::thread::spawn(move || {
        let _ = server.serve();
    });
    std::thread::sleep(std::time::Duration::from_millis(50));

    let mut stream = UnixStream::connect(&path).expect("connect");
    call(&mut stream, &Request::Init { base_address: 0 });

    let socket = match call(&mut stream, &Request::Socket { domain: Domain::Inet, kind: SockKind::Dgram, protocol: 0 }) {
        Reply::Socket(id) => id,
        other => panic!("unexpected reply to socket(): {other:?}"),
    };
    // The socket reply's ancillary `SCM_RIGHTS` fds are never consumed
    // here: a plain `read` still sees the reply body, and this process
    // exits at the end of the benchmark run.

    let mut group = c.benchmark_group("server");
    group.bench_function("getsockopt_round_trip", |bencher| {
        bencher.iter(|| {
            let reply = call(
                &mut stream,
                &Request::GetSockOpt { socket, level: OptLevel::SolSocket, name: OptName::SoReuseAddr },
            );
            assert!(matches!(reply, Reply::OptValue(_)));
        });
    });
    group.finish();

    let _ = call(&mut stream, &Request::Close { socket });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
