//! Bridges a socket's channel to its PCB (spec §2 data-plane flow: TX
//! "client → C2 channel → C6 decodes request → C5 PCB send → C4 TX
//! queue → NIC", RX the mirror of that). One [`SocketPump`] is created
//! alongside every socket's channel and torn down with it;
//! [`crate::handler::Handler::service_channels`] drains every open
//! socket's pump once per call.
//!
//! Neither direction has a real interrupt source in this workspace's
//! reference stack (`netstack::LoopbackStack` delivers by internal
//! queue, not by waking a caller), so both are meant to be serviced
//! the way the spinning loop services an RX queue whose driver cannot
//! raise a notifier (spec §4.4): a short, non-blocking poll, in
//! rotation with everything else a worker owns.

use netstack::{PcbId, StackHandle};

use channel::{ServerDatagramEnd, ServerStreamEnd};

use crate::socket::SocketKind;

const STREAM_CHUNK: usize = 4096;
const DATAGRAM_RECV_MAX: usize = 65_535;

/// Either channel shape a socket can carry (spec §3: stream for TCP,
/// datagram for RAW/UDP/PACKET/ICMP).
pub enum PumpChannel {
    Stream(ServerStreamEnd),
    Datagram(ServerDatagramEnd),
}

/// Drives one socket's bytes between its channel and its PCB.
pub struct SocketPump {
    pcb: PcbId,
    kind: SocketKind,
    channel: PumpChannel,
    /// Mirrors `Socket::options.icmp_filter`; refreshed by
    /// `Handler::do_setsockopt` on every `IcmpFilter` write so the recv
    /// half can drop filtered types without reaching back into the
    /// socket table on every poll.
    icmp_filter: [u64; 4],
}

impl SocketPump {
    pub fn new(pcb: PcbId, kind: SocketKind, channel: PumpChannel) -> Self {
        Self {
            pcb,
            kind,
            channel,
            icmp_filter: [0; 4],
        }
    }

    pub fn set_icmp_filter(&mut self, filter: [u64; 4]) {
        self.icmp_filter = filter;
    }

    fn icmp_type_allowed(&self, payload: &[u8]) -> bool {
        if self.kind != SocketKind::Icmp {
            return true;
        }
        let Some(&icmp_type) = payload.first() else {
            return true;
        };
        let word = (icmp_type / 64) as usize;
        let bit = icmp_type % 64;
        self.icmp_filter[word] & (1 << bit) == 0
    }

    /// One round of the send direction: drains whatever the client has
    /// already written into its half of the channel onto the PCB.
    /// Returns the number of bytes (stream) or records (datagram)
    /// handed off.
    pub fn pump_send(&self, stack: &StackHandle) -> usize {
        match &self.channel {
            PumpChannel::Stream(server) => {
                let mut buf = [0u8; STREAM_CHUNK];
                let n = server.read(&mut buf);
                if n == 0 {
                    return 0;
                }
                let pcb = self.pcb;
                let data = buf[..n].to_vec();
                let _ = stack.submit(move |stack| stack.pcb_send(pcb, &data));
                n
            }
            PumpChannel::Datagram(server) => {
                let mut moved = 0;
                while let Some((payload, _addr)) = server.recv() {
                    let pcb = self.pcb;
                    let _ = stack.submit(move |stack| stack.pcb_send(pcb, &payload));
                    moved += 1;
                }
                moved
            }
        }
    }

    /// One round of the recv direction: pulls whatever the stack has
    /// queued for this PCB and writes it into the channel the client
    /// reads from, dropping ICMP frames the socket's filter excludes
    /// before they ever reach the ring (spec §4.6, ICMP specialization).
    pub fn pump_recv(&self, stack: &StackHandle) -> usize {
        let pcb = self.pcb;
        match &self.channel {
            PumpChannel::Stream(server) => {
                let Some(data) = stack
                    .submit(move |stack| stack.pcb_recv(pcb, STREAM_CHUNK))
                    .ok()
                    .and_then(Result::ok)
                else {
                    return 0;
                };
                if data.is_empty() {
                    return 0;
                }
                server.write(&data)
            }
            PumpChannel::Datagram(server) => {
                let Some(data) = stack
                    .submit(move |stack| stack.pcb_recv(pcb, DATAGRAM_RECV_MAX))
                    .ok()
                    .and_then(Result::ok)
                else {
                    return 0;
                };
                if data.is_empty() {
                    return 0;
                }
                if !self.icmp_type_allowed(&data) {
                    return 0;
                }
                usize::from(server.send(&data, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arena::Arena;
    use channel::notify::CountingNotifier;
    use channel::{ClientDatagramEnd, ClientStreamEnd, DatagramChannel, StreamChannel};
    use netstack::{LoopbackStack, PcbKind, StackThread};
    use parking_lot::Mutex;

    use super::*;

    fn stack_handle() -> StackHandle {
        let (_thread, handle) = StackThread::spawn(Box::new(LoopbackStack::new()));
        handle
    }

    #[test]
    fn stream_pump_moves_client_bytes_onto_the_pcb() {
        let stack = stack_handle();
        let a = stack.submit(|s| s.pcb_new(PcbKind::Tcp)).unwrap();
        let b = stack.submit(|s| s.pcb_new(PcbKind::Tcp)).unwrap();

        let addr_a: std::net::SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let addr_b: std::net::SocketAddr = "127.0.0.1:9101".parse().unwrap();
        stack.submit(move |s| s.pcb_bind(a, addr_a)).unwrap().unwrap();
        stack.submit(move |s| s.pcb_bind(b, addr_b)).unwrap().unwrap();
        stack.submit(move |s| s.pcb_connect(a, addr_b)).unwrap().unwrap();

        let arena = Arc::new(Mutex::new(Arena::new(1 << 20)));
        let channel =
            StreamChannel::new(arena, 4096, CountingNotifier::new(), CountingNotifier::new()).unwrap();
        let client = ClientStreamEnd(channel.clone());
        let server = ServerStreamEnd(channel);

        let pump_a = SocketPump::new(a, SocketKind::Tcp, PumpChannel::Stream(server));

        assert_eq!(client.write(b"hello world!"), 12);
        assert_eq!(pump_a.pump_send(&stack), 12);
        assert_eq!(stack.submit(move |s| s.pcb_recv(b, 64)).unwrap().unwrap(), b"hello world!");
    }

    #[test]
    fn stream_pump_recv_delivers_pcb_data_to_the_client() {
        let stack = stack_handle();
        let a = stack.submit(|s| s.pcb_new(PcbKind::Tcp)).unwrap();
        let b = stack.submit(|s| s.pcb_new(PcbKind::Tcp)).unwrap();

        let addr_a: std::net::SocketAddr = "127.0.0.1:9200".parse().unwrap();
        let addr_b: std::net::SocketAddr = "127.0.0.1:9201".parse().unwrap();
        stack.submit(move |s| s.pcb_bind(a, addr_a)).unwrap().unwrap();
        stack.submit(move |s| s.pcb_bind(b, addr_b)).unwrap().unwrap();
        stack.submit(move |s| s.pcb_connect(b, addr_a)).unwrap().unwrap();
        stack.submit(move |s| s.pcb_send(b, b"ack")).unwrap().unwrap();

        let arena = Arc::new(Mutex::new(Arena::new(1 << 20)));
        let channel =
            StreamChannel::new(arena, 4096, CountingNotifier::new(), CountingNotifier::new()).unwrap();
        let client = ClientStreamEnd(channel.clone());
        let server = ServerStreamEnd(channel);

        let pump_a = SocketPump::new(a, SocketKind::Tcp, PumpChannel::Stream(server));
        assert_eq!(pump_a.pump_recv(&stack), 3);

        let mut buf = [0u8; 8];
        let n = client.read(&mut buf);
        assert_eq!(&buf[..n], b"ack");
    }

    #[test]
    fn icmp_filter_drops_blocked_type_before_it_reaches_the_channel() {
        let stack = stack_handle();
        let pcb = stack.submit(|s| s.pcb_new(PcbKind::Raw)).unwrap();
        let peer = stack.submit(|s| s.pcb_new(PcbKind::Raw)).unwrap();

        let local: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();
        let remote: std::net::SocketAddr = "127.0.0.1:2".parse().unwrap();
        stack.submit(move |s| s.pcb_bind(pcb, local)).unwrap().unwrap();
        stack.submit(move |s| s.pcb_bind(peer, remote)).unwrap().unwrap();

        let echo_reply = [0u8, 0, 0, 0];
        let echo_request = [8u8, 0, 0, 0];
        stack
            .submit(move |s| {
                s.pcb_connect(peer, local).unwrap();
                s.pcb_send(peer, &echo_reply).unwrap();
                s.pcb_send(peer, &echo_request).unwrap();
            })
            .unwrap();

        let arena = Arc::new(Mutex::new(Arena::new(1 << 20)));
        let channel =
            DatagramChannel::new(arena, 1 << 16, 2048, 64, CountingNotifier::new(), CountingNotifier::new())
                .unwrap();
        let server = ServerDatagramEnd(channel.clone());
        let client = ClientDatagramEnd(channel);

        let mut pump = SocketPump::new(pcb, SocketKind::Icmp, PumpChannel::Datagram(server));
        // Blocks type 8 only (spec §8 scenario 2's filter installs bit 8).
        pump.set_icmp_filter([1u64 << 8, 0, 0, 0]);

        assert_eq!(pump.pump_recv(&stack), 1);
        assert_eq!(pump.pump_recv(&stack), 0);

        let (payload, _) = client.recv().unwrap();
        assert_eq!(payload, echo_reply);
        assert!(client.recv().is_none());
    }
}
