//! The RX and TX burst dispatch pipelines (spec §4.4).

use std::sync::Arc;

use fib::{Directory, InterfaceId, PortId};

/// A frame as it arrives off an RX queue. `generator_tagged` mirrors a
/// hardware offload tag identifying generator-originated traffic, which
/// skips the stack entirely.
pub struct Frame {
    pub data: Vec<u8>,
    pub generator_tagged: bool,
}

impl Frame {
    fn dst_mac(&self) -> Option<[u8; 6]> {
        if self.data.len() < 6 {
            return None;
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.data[..6]);
        Some(mac)
    }

    fn is_multicast(&self) -> bool {
        self.data.first().is_some_and(|b| b & 0x01 != 0)
    }
}

/// An RX queue driver: something that can report descriptor
/// availability and burst-receive frames.
pub trait RxQueue: Send {
    fn has_descriptor_available(&self) -> bool;
    fn burst_receive(&mut self, max: usize) -> Vec<Frame>;
}

/// Handed generator-bypassed, non-generator-tagged frames after optional
/// software GRO.
pub trait StackInput: Send + Sync {
    fn input(&self, interface: InterfaceId, frame: Vec<u8>);
}

/// Software prefetch hint: the RX pipeline issues this `PREFETCH_AHEAD`
/// frames ahead of the one being parsed, to overlap DRAM latency with
/// header parsing. There is no portable prefetch intrinsic in stable
/// Rust, so this is a documented no-op rather than a fabricated one;
/// the pipeline still walks the burst in prefetch-ahead order so that
/// swapping in a real intrinsic later is a one-line change.
const PREFETCH_AHEAD: usize = 8;

#[inline]
fn prefetch_hint(_frame: &Frame) {}

/// Drives the RX dispatch pipeline in spec §4.4 order for frames already
/// pulled off one RX queue belonging to `port`.
pub struct RxDispatcher {
    pub port: PortId,
    pub directory: Arc<Directory>,
    pub stack: Arc<dyn StackInput>,
}

impl RxDispatcher {
    /// Runs steps 2 through 6 of the RX dispatch pipeline over a burst
    /// already pulled from the queue by the caller (step 1).
    pub fn dispatch_burst(&self, frames: Vec<Frame>) {
        for (i, frame) in frames.iter().enumerate() {
            if let Some(ahead) = frames.get(i + PREFETCH_AHEAD) {
                prefetch_hint(ahead);
            }
        }

        let snapshot = self.directory.load();
        let Some(port_fib) = snapshot.port(self.port) else {
            return;
        };

        if !port_fib.rx_sinks().is_empty() {
            let refs: Vec<Vec<u8>> = frames.iter().map(|f| f.data.clone()).collect();
            for sink in port_fib.rx_sinks() {
                sink.on_rx_burst(None, &refs);
            }
        }

        let mut run_interface: Option<InterfaceId> = None;
        let mut run: Vec<Vec<u8>> = Vec::new();

        let flush = |interface: Option<InterfaceId>, run: &mut Vec<Vec<u8>>| {
            if run.is_empty() {
                return;
            }
            if let Some(interface) = interface
                && let Some(entry) = port_fib
                    .interfaces()
                    .iter()
                    .find(|entry| entry.interface_id == interface)
            {
                for sink in &entry.rx_sinks {
                    sink.on_rx_burst(Some(interface), run);
                }
            }
            run.clear();
        };

        for frame in frames {
            if frame.is_multicast() {
                flush(run_interface.take(), &mut run);
                self.deliver(&frame);
                continue;
            }

            let Some(mac) = frame.dst_mac() else {
                flush(run_interface.take(), &mut run);
                continue;
            };

            match port_fib.resolve(&mac) {
                Some(entry) if Some(entry.interface_id) == run_interface => {
                    run.push(frame.data.clone());
                    self.deliver(&frame);
                }
                Some(entry) => {
                    flush(run_interface.take(), &mut run);
                    run_interface = Some(entry.interface_id);
                    run.push(frame.data.clone());
                    self.deliver(&frame);
                }
                None => {
                    // Unresolved unicast frame: freed (dropped), per
                    // step 6, after flushing whatever run was pending.
                    flush(run_interface.take(), &mut run);
                }
            }
        }
        flush(run_interface.take(), &mut run);
    }

    fn deliver(&self, frame: &Frame) {
        if frame.generator_tagged {
            return;
        }
        let reassembled = gro_reassemble(&frame.data);
        self.stack.input(self.port, reassembled);
    }
}

/// Software GRO reassembly. A burst-scoped coalescing pass belongs on
/// the caller's side of this boundary (it needs the whole burst, not
/// one frame); this stub is the per-frame identity case, called once
/// segment coalescing has already happened upstream.
fn gro_reassemble(data: &[u8]) -> Vec<u8> {
    data.to_vec()
}

/// A TX ring: something a worker dequeues frames from to transmit.
pub trait TxRing: Send {
    fn non_empty(&self) -> bool;
    fn dequeue(&mut self, max: usize) -> Vec<Vec<u8>>;
    /// Buffers frames the retry budget ran out on so they are dequeued
    /// again, ahead of anything enqueued since (spec §4.4's TX task
    /// contract: "retry up to K times then buffer residue").
    fn requeue(&mut self, frames: Vec<Vec<u8>>);
}

/// The NIC side of the TX path: bursts frames out, returning how many
/// were actually accepted (fewer than requested means the ring is
/// full and the caller should retry the remainder).
pub trait TxNic: Send {
    fn burst_transmit(&mut self, frames: &[Vec<u8>]) -> usize;
    fn reenable_notifications(&mut self);
}

pub struct TxDispatcher {
    pub port: PortId,
    pub directory: Arc<Directory>,
    pub retry_limit: u32,
    pub initial_backoff: std::time::Duration,
}

impl TxDispatcher {
    /// Runs the TX dispatch pipeline: dequeue, fan out to port-level TX
    /// sinks, then transmit with exponential-backoff retry.
    pub fn dispatch_burst(&self, ring: &mut dyn TxRing, nic: &mut dyn TxNic, max: usize) {
        let frames = ring.dequeue(max);
        if frames.is_empty() {
            return;
        }

        let snapshot = self.directory.load();
        if let Some(port_fib) = snapshot.port(self.port) {
            for sink in port_fib.tx_sinks() {
                sink.on_tx_burst(&frames);
            }
        }

        let mut remaining = &frames[..];
        let mut backoff = self.initial_backoff;

        for _ in 0..=self.retry_limit {
            if remaining.is_empty() {
                break;
            }
            let sent = nic.burst_transmit(remaining);
            remaining = &remaining[sent..];
            if !remaining.is_empty() {
                std::thread::sleep(backoff);
                backoff *= 2;
            }
        }

        if !remaining.is_empty() {
            ring.requeue(remaining.to_vec());
        }

        nic.reenable_notifications();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fib::RxSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingStack(AtomicUsize);

    impl StackInput for RecordingStack {
        fn input(&self, _interface: InterfaceId, _frame: Vec<u8>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct CountingSink(AtomicUsize);

    impl RxSink for CountingSink {
        fn on_rx_burst(&self, _interface: Option<InterfaceId>, frames: &[Vec<u8>]) {
            self.0.fetch_add(frames.len(), Ordering::Relaxed);
        }
    }

    fn frame(dst: [u8; 6]) -> Frame {
        let mut data = vec![0u8; 64];
        data[..6].copy_from_slice(&dst);
        Frame {
            data,
            generator_tagged: false,
        }
    }

    #[test]
    fn unresolved_unicast_frames_are_dropped_not_delivered() {
        let directory = Arc::new(Directory::new());
        directory.publish(directory.edit());
        let stack = Arc::new(RecordingStack(AtomicUsize::new(0)));

        let dispatcher = RxDispatcher {
            port: 0,
            directory,
            stack: stack.clone(),
        };

        dispatcher.dispatch_burst(vec![frame([0x02, 0, 0, 0, 0, 9])]);
        assert_eq!(stack.0.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn port_level_sinks_see_every_frame_in_the_burst() {
        let directory = Arc::new(Directory::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let mut builder = directory.edit();
        builder.add_port_rx_sink(0, sink.clone());
        directory.publish(builder);

        let stack = Arc::new(RecordingStack(AtomicUsize::new(0)));
        let dispatcher = RxDispatcher {
            port: 0,
            directory,
            stack,
        };

        dispatcher.dispatch_burst(vec![frame([0x02, 0, 0, 0, 0, 1]), frame([0x02, 0, 0, 0, 0, 2])]);
        assert_eq!(sink.0.load(Ordering::Relaxed), 2);
    }

    struct ScriptedNic {
        accept_per_call: Vec<usize>,
        call: usize,
        reenabled: bool,
    }

    impl TxNic for ScriptedNic {
        fn burst_transmit(&mut self, frames: &[Vec<u8>]) -> usize {
            let accept = self.accept_per_call.get(self.call).copied().unwrap_or(frames.len());
            self.call += 1;
            accept.min(frames.len())
        }

        fn reenable_notifications(&mut self) {
            self.reenabled = true;
        }
    }

    struct VecRing(Vec<Vec<u8>>);

    impl TxRing for VecRing {
        fn non_empty(&self) -> bool {
            !self.0.is_empty()
        }

        fn dequeue(&mut self, max: usize) -> Vec<Vec<u8>> {
            let n = max.min(self.0.len());
            self.0.drain(..n).collect()
        }

        fn requeue(&mut self, mut frames: Vec<Vec<u8>>) {
            frames.append(&mut self.0);
            self.0 = frames;
        }
    }

    #[test]
    fn tx_dispatch_retries_residue_then_reenables_notifications() {
        let directory = Arc::new(Directory::new());
        directory.publish(directory.edit());

        let dispatcher = TxDispatcher {
            port: 0,
            directory,
            retry_limit: 3,
            initial_backoff: std::time::Duration::from_micros(1),
        };

        let mut ring = VecRing(vec![vec![0u8; 8]; 4]);
        let mut nic = ScriptedNic {
            accept_per_call: vec![2, 2],
            call: 0,
            reenabled: false,
        };

        dispatcher.dispatch_burst(&mut ring, &mut nic, 4);
        assert_eq!(nic.call, 2);
        assert!(nic.reenabled);
    }

    #[test]
    fn tx_dispatch_buffers_residue_on_the_ring_once_the_retry_budget_is_exhausted() {
        let directory = Arc::new(Directory::new());
        directory.publish(directory.edit());

        let dispatcher = TxDispatcher {
            port: 0,
            directory,
            retry_limit: 2,
            initial_backoff: std::time::Duration::from_micros(1),
        };

        let mut ring = VecRing(vec![vec![0u8; 8]; 4]);
        let mut nic = ScriptedNic {
            accept_per_call: vec![1, 0, 0],
            call: 0,
            reenabled: false,
        };

        dispatcher.dispatch_burst(&mut ring, &mut nic, 4);

        // One frame got out; the other three exhausted the retry budget
        // and must still be on the ring, not lost.
        assert_eq!(ring.0.len(), 3);
        assert!(nic.reenabled);
    }
}
