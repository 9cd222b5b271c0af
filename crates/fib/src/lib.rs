//! Forwarding and transmit information bases: the read-mostly lookup
//! tables workers consult on every burst.
//!
//! Both tables live inside one [`Snapshot`], published as a whole by the
//! control thread through [`Directory::publish`]. A worker never takes a
//! lock to read them: it calls [`Directory::load`], gets back an
//! `Arc<Snapshot>` pinned for as long as it holds the guard, and looks up
//! whatever it needs directly. Writers build the next snapshot off to the
//! side, from a full clone of the one currently published, and swap it in
//! with a single pointer store.
//!
//! Memory safety of the old snapshot is already handled by `Arc` — a
//! worker mid-burst holds its own strong reference regardless of what the
//! directory points to next. [`Reclaimer`] exists on top of that for a
//! different reason: it lets the control thread defer the (possibly not
//! cheap) drop of a retired snapshot until every worker has crossed a
//! quiescent point, rather than paying for it inline on the publishing
//! thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::Mutex;

pub type PortId = u32;
pub type QueueId = u32;
pub type InterfaceId = u32;
pub type SourceId = u32;

/// A frame's destination MAC packed into the low 48 bits of a `u64`, the
/// direct-mapped hash key for [`PortFib::mac_table`].
pub fn mac_key(mac: &[u8; 6]) -> u64 {
    let mut key = 0u64;
    for byte in mac {
        key = (key << 8) | *byte as u64;
    }
    key
}

/// RX sink: something that wants a reference to every burst landing on a
/// port or, more specifically, on one of the port's interfaces.
pub trait RxSink: Send + Sync {
    fn on_rx_burst(&self, interface: Option<InterfaceId>, frames: &[Vec<u8>]);
}

/// TX sink: mirrors [`RxSink`] for the transmit path.
pub trait TxSink: Send + Sync {
    fn on_tx_burst(&self, frames: &[Vec<u8>]);
}

/// A transmit source: the generator or a socket's outbound queue,
/// addressed by `(port, queue, source_id)` in the [`Tib`].
pub trait TxSource: Send + Sync {
    fn active(&self) -> bool;
    fn burst_size(&self) -> usize;
    fn packet_rate(&self) -> u64;
    /// Writes up to `burst_size()` frames into `out`, returning how many
    /// were produced.
    fn transform(&self, out: &mut Vec<Vec<u8>>) -> usize;
}

/// `MAC → interface_entry`: the stack interface reachable through that
/// MAC, plus the interface-level sinks fed alongside the port-level ones.
pub struct InterfaceEntry {
    pub interface_id: InterfaceId,
    pub rx_sinks: Vec<Arc<dyn RxSink>>,
    pub tx_sinks: Vec<Arc<dyn TxSink>>,
}

/// Per-port forwarding state: the MAC table, the port-level sink
/// vectors, and an indexable vector of the port's interfaces.
#[derive(Default)]
pub struct PortFib {
    mac_table: AHashMap<u64, Arc<InterfaceEntry>>,
    rx_sinks: Vec<Arc<dyn RxSink>>,
    tx_sinks: Vec<Arc<dyn TxSink>>,
    interfaces: Vec<Arc<InterfaceEntry>>,
}

impl PortFib {
    pub fn resolve(&self, mac: &[u8; 6]) -> Option<&Arc<InterfaceEntry>> {
        self.mac_table.get(&mac_key(mac))
    }

    pub fn rx_sinks(&self) -> &[Arc<dyn RxSink>] {
        &self.rx_sinks
    }

    pub fn tx_sinks(&self) -> &[Arc<dyn TxSink>] {
        &self.tx_sinks
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceEntry>] {
        &self.interfaces
    }
}

/// `(port, queue, source_id) → source_handle`, kept as a small vector
/// per `(port, queue)` and scanned linearly: the spec calls for "never
/// more than a few dozen sources per queue", well under the point where
/// a hash map would pay for itself.
#[derive(Default)]
pub struct Tib {
    sources: AHashMap<(PortId, QueueId), Vec<(SourceId, Arc<dyn TxSource>)>>,
}

impl Tib {
    pub fn lookup(&self, port: PortId, queue: QueueId, source: SourceId) -> Option<&Arc<dyn TxSource>> {
        self.sources
            .get(&(port, queue))?
            .iter()
            .find(|(id, _)| *id == source)
            .map(|(_, handle)| handle)
    }

    pub fn sources_for(&self, port: PortId, queue: QueueId) -> &[(SourceId, Arc<dyn TxSource>)] {
        self.sources
            .get(&(port, queue))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The whole published table, generation-tagged so a retired copy can be
/// matched against the quiescence counters that must pass it before the
/// reclaimer drops it.
#[derive(Default)]
pub struct Snapshot {
    pub generation: u64,
    pub ports: AHashMap<PortId, PortFib>,
    pub tib: Tib,
}

impl Snapshot {
    pub fn port(&self, port: PortId) -> Option<&PortFib> {
        self.ports.get(&port)
    }
}

/// A mutable scratch copy of a [`Snapshot`], edited off-path and then
/// handed to [`Directory::publish`].
pub struct SnapshotBuilder {
    generation: u64,
    ports: AHashMap<PortId, PortFib>,
    tib: Tib,
}

impl SnapshotBuilder {
    pub fn port_mut(&mut self, port: PortId) -> &mut PortFib {
        self.ports.entry(port).or_default()
    }

    pub fn add_interface(&mut self, port: PortId, entry: InterfaceEntry, macs: &[[u8; 6]]) {
        let entry = Arc::new(entry);
        let port_fib = self.port_mut(port);
        port_fib.interfaces.push(entry.clone());
        for mac in macs {
            port_fib.mac_table.insert(mac_key(mac), entry.clone());
        }
    }

    pub fn remove_interface(&mut self, port: PortId, interface_id: InterfaceId) {
        if let Some(port_fib) = self.ports.get_mut(&port) {
            port_fib.interfaces.retain(|entry| entry.interface_id != interface_id);
            port_fib
                .mac_table
                .retain(|_, entry| entry.interface_id != interface_id);
        }
    }

    pub fn add_port_rx_sink(&mut self, port: PortId, sink: Arc<dyn RxSink>) {
        self.port_mut(port).rx_sinks.push(sink);
    }

    pub fn add_port_tx_sink(&mut self, port: PortId, sink: Arc<dyn TxSink>) {
        self.port_mut(port).tx_sinks.push(sink);
    }

    pub fn add_source(&mut self, port: PortId, queue: QueueId, id: SourceId, handle: Arc<dyn TxSource>) {
        let sources = self.tib.sources.entry((port, queue)).or_default();
        sources.push((id, handle));
        sources.sort_by_key(|(id, _)| *id);
    }

    pub fn remove_source(&mut self, port: PortId, queue: QueueId, id: SourceId) {
        if let Some(sources) = self.tib.sources.get_mut(&(port, queue)) {
            sources.retain(|(existing, _)| *existing != id);
        }
    }

    fn build(self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            ports: self.ports,
            tib: self.tib,
        }
    }
}

/// Published pointer plus the per-worker quiescence tracking used to
/// schedule deferred reclaim of retired snapshots.
///
/// # Test
///
/// ```
/// use openperf_fib::Directory;
///
/// let directory = Directory::new();
/// let builder = directory.edit();
/// directory.publish(builder);
/// assert_eq!(directory.load().port(0), None);
/// ```
pub struct Directory {
    published: ArcSwap<Snapshot>,
    next_generation: AtomicU64,
    reclaimer: Reclaimer,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self {
            published: ArcSwap::from_pointee(Snapshot::default()),
            next_generation: AtomicU64::new(1),
            reclaimer: Reclaimer::default(),
        }
    }

    /// Pins the currently published snapshot for the caller's use.
    pub fn load(&self) -> arc_swap::Guard<Arc<Snapshot>> {
        self.published.load()
    }

    /// Builds a fresh [`SnapshotBuilder`] seeded from the currently
    /// published snapshot's contents (the "off-path" copy the writer
    /// edits before publishing).
    pub fn edit(&self) -> SnapshotBuilder {
        let current = self.published.load();
        SnapshotBuilder {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            ports: current
                .ports
                .iter()
                .map(|(port, fib)| {
                    (
                        *port,
                        PortFib {
                            mac_table: fib.mac_table.clone(),
                            rx_sinks: fib.rx_sinks.clone(),
                            tx_sinks: fib.tx_sinks.clone(),
                            interfaces: fib.interfaces.clone(),
                        },
                    )
                })
                .collect(),
            tib: Tib {
                sources: current.tib.sources.clone(),
            },
        }
    }

    /// Publishes `builder` as the new snapshot with a single pointer
    /// swap, then hands the outgoing snapshot to the reclaimer.
    pub fn publish(&self, builder: SnapshotBuilder) {
        let generation = builder.generation;
        let next = Arc::new(builder.build());
        let previous = self.published.swap(next);
        self.reclaimer.retire(previous, generation);
    }

    /// Registers a worker so the reclaimer knows to wait on its
    /// generation counter. Returns the handle the worker calls
    /// [`Reclaimer::mark_quiescent`] with once per outer poll iteration.
    pub fn register_worker(&self) -> WorkerId {
        self.reclaimer.register_worker()
    }

    pub fn mark_quiescent(&self, worker: WorkerId) {
        self.reclaimer.mark_quiescent(worker, self.next_generation.load(Ordering::Relaxed));
    }

    /// Drops every retired snapshot that every registered worker has
    /// crossed. Safe to call from any thread at any rate; it only ever
    /// frees memory, never blocks a reader.
    pub fn reclaim(&self) {
        self.reclaimer.sweep();
    }

    pub fn pending_reclaims(&self) -> usize {
        self.reclaimer.pending.lock().len()
    }
}

pub type WorkerId = usize;

struct Retired {
    generation: u64,
    snapshot: Arc<Snapshot>,
}

/// Defers the drop of retired snapshots until every worker has declared
/// quiescence at or past the snapshot's publish generation.
#[derive(Default)]
struct Reclaimer {
    worker_generations: Mutex<Vec<AtomicU64>>,
    pending: Mutex<VecDeque<Retired>>,
}

impl Reclaimer {
    fn register_worker(&self) -> WorkerId {
        let mut workers = self.worker_generations.lock();
        workers.push(AtomicU64::new(0));
        workers.len() - 1
    }

    fn mark_quiescent(&self, worker: WorkerId, generation: u64) {
        let workers = self.worker_generations.lock();
        workers[worker].store(generation, Ordering::Release);
    }

    fn retire(&self, snapshot: Arc<Snapshot>, generation: u64) {
        self.pending.lock().push_back(Retired { generation, snapshot });
    }

    /// Drops the prefix of the pending queue whose generation every
    /// registered worker has observed. Snapshots retire in publish
    /// order, so a prefix scan (rather than a full pass) is enough.
    fn sweep(&self) {
        let workers = self.worker_generations.lock();
        let min_generation = workers.iter().map(|g| g.load(Ordering::Acquire)).min().unwrap_or(u64::MAX);

        let mut pending = self.pending.lock();
        while let Some(front) = pending.front() {
            if front.generation > min_generation {
                break;
            }
            pending.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRxSink(AtomicUsize);

    impl RxSink for CountingRxSink {
        fn on_rx_burst(&self, _interface: Option<InterfaceId>, frames: &[Vec<u8>]) {
            self.0.fetch_add(frames.len(), Ordering::Relaxed);
        }
    }

    struct FixedSource {
        burst: usize,
        rate: u64,
    }

    impl TxSource for FixedSource {
        fn active(&self) -> bool {
            true
        }

        fn burst_size(&self) -> usize {
            self.burst
        }

        fn packet_rate(&self) -> u64 {
            self.rate
        }

        fn transform(&self, out: &mut Vec<Vec<u8>>) -> usize {
            for _ in 0..self.burst {
                out.push(vec![0u8; 64]);
            }
            self.burst
        }
    }

    #[test]
    fn mac_key_packs_low_48_bits() {
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        assert_eq!(mac_key(&mac), 0x0011_2233_4455);
    }

    #[test]
    fn publish_is_visible_to_subsequent_loads() {
        let directory = Directory::new();

        let mut builder = directory.edit();
        builder.add_interface(
            0,
            InterfaceEntry {
                interface_id: 7,
                rx_sinks: Vec::new(),
                tx_sinks: Vec::new(),
            },
            &[[0x02, 0, 0, 0, 0, 1]],
        );
        directory.publish(builder);

        let snapshot = directory.load();
        let resolved = snapshot.port(0).unwrap().resolve(&[0x02, 0, 0, 0, 0, 1]).unwrap();
        assert_eq!(resolved.interface_id, 7);
    }

    #[test]
    fn a_reader_holding_a_guard_keeps_a_retired_snapshot_alive() {
        let directory = Directory::new();

        let mut first = directory.edit();
        first.add_port_rx_sink(0, Arc::new(CountingRxSink(AtomicUsize::new(0))));
        directory.publish(first);

        let guard = directory.load();
        let sinks_seen = guard.port(0).unwrap().rx_sinks().len();

        let second = directory.edit();
        directory.publish(second);

        assert_eq!(sinks_seen, 1);
        assert_eq!(guard.port(0).unwrap().rx_sinks().len(), 1);
    }

    #[test]
    fn reclaim_waits_for_every_worker_to_cross_the_generation() {
        let directory = Directory::new();
        let w0 = directory.register_worker();
        let w1 = directory.register_worker();

        directory.publish(directory.edit());
        assert_eq!(directory.pending_reclaims(), 1);

        directory.mark_quiescent(w0, 1);
        directory.reclaim();
        assert_eq!(directory.pending_reclaims(), 1, "worker 1 has not caught up yet");

        directory.mark_quiescent(w1, 1);
        directory.reclaim();
        assert_eq!(directory.pending_reclaims(), 0);
    }

    #[test]
    fn tib_lookup_is_linear_over_a_sorted_vector() {
        let directory = Directory::new();
        let mut builder = directory.edit();
        builder.add_source(0, 0, 5, Arc::new(FixedSource { burst: 32, rate: 1_000_000 }));
        builder.add_source(0, 0, 2, Arc::new(FixedSource { burst: 8, rate: 500 }));
        directory.publish(builder);

        let snapshot = directory.load();
        let ids: Vec<_> = snapshot.tib.sources_for(0, 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 5]);

        let source = snapshot.tib.lookup(0, 0, 5).unwrap();
        assert_eq!(source.burst_size(), 32);
        assert_eq!(source.packet_rate(), 1_000_000);
    }
}
