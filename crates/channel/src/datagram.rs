use std::collections::VecDeque;
use std::net::{SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arena::Arena;
use parking_lot::Mutex;

use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Link([u8; 6]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The maximum record size requested at creation exceeds half the
    /// ring's payload capacity.
    RecordTooLarge,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

struct Descriptor {
    address: Option<Address>,
    offset: u64,
    len: usize,
}

struct Inner {
    descriptors: VecDeque<Descriptor>,
    max_records: usize,
}

/// One direction of a datagram ring: fixed-count record descriptors plus a
/// circular bump buffer (inside the arena) for their payload bytes.
pub struct RecordRing {
    arena: Arc<Mutex<Arena>>,
    payload_offset: usize,
    payload_capacity: u64,
    max_record_size: usize,

    write_cursor: AtomicU64,

    inner: Mutex<Inner>,

    reader_notifier: Arc<dyn Notifier>,
    writer_notifier: Arc<dyn Notifier>,
}

impl RecordRing {
    pub fn new(
        arena: Arc<Mutex<Arena>>,
        payload_capacity: usize,
        max_record_size: usize,
        max_records: usize,
        reader_notifier: Arc<dyn Notifier>,
        writer_notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        if max_record_size > payload_capacity / 2 {
            return Err(Error::RecordTooLarge);
        }

        let payload_offset = arena
            .lock()
            .reserve(payload_capacity)
            .map_err(|_| Error::RecordTooLarge)?;

        Ok(Self {
            arena,
            payload_offset,
            payload_capacity: payload_capacity as u64,
            max_record_size,
            write_cursor: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                descriptors: VecDeque::with_capacity(max_records),
                max_records,
            }),
            reader_notifier,
            writer_notifier,
        })
    }

    /// Enqueues `payload` (and its optional address) atomically: either the
    /// descriptor and the full payload both fit, or nothing is enqueued.
    pub fn send(&self, payload: &[u8], address: Option<Address>) -> bool {
        if payload.len() > self.max_record_size {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.descriptors.len() >= inner.max_records {
            return false;
        }

        let used: u64 = inner.descriptors.iter().map(|d| d.len as u64).sum();

        if used + payload.len() as u64 > self.payload_capacity {
            return false;
        }

        let offset = self.bump(payload.len());
        self.copy_in(offset, payload);

        inner.descriptors.push_back(Descriptor {
            address,
            offset,
            len: payload.len(),
        });

        let was_empty = inner.descriptors.len() == 1;
        drop(inner);

        if was_empty {
            self.reader_notifier.notify();
        }

        true
    }

    /// Dequeues the oldest record, never splitting it.
    pub fn recv(&self) -> Option<(Vec<u8>, Option<Address>)> {
        let mut inner = self.inner.lock();
        let was_full = inner.descriptors.len() == inner.max_records;
        let descriptor = inner.descriptors.pop_front()?;
        drop(inner);

        let mut payload = vec![0u8; descriptor.len];
        self.copy_out(descriptor.offset, &mut payload);

        if was_full {
            self.writer_notifier.notify();
        }

        Some((payload, descriptor.address))
    }

    fn bump(&self, len: usize) -> u64 {
        let capacity = self.payload_capacity;
        let current = self.write_cursor.load(Ordering::Relaxed);
        self.write_cursor
            .store((current + len as u64) % capacity.max(1), Ordering::Release);

        current % capacity.max(1)
    }

    fn copy_in(&self, offset: u64, buf: &[u8]) {
        let mut arena = self.arena.lock();
        let capacity = self.payload_capacity as usize;
        let start = offset as usize;
        let first = buf.len().min(capacity - start);

        arena
            .slice_mut(self.payload_offset + start, first)
            .copy_from_slice(&buf[..first]);

        if first < buf.len() {
            arena
                .slice_mut(self.payload_offset, buf.len() - first)
                .copy_from_slice(&buf[first..]);
        }
    }

    fn copy_out(&self, offset: u64, buf: &mut [u8]) {
        let arena = self.arena.lock();
        let capacity = self.payload_capacity as usize;
        let start = offset as usize;
        let first = buf.len().min(capacity - start);

        buf[..first].copy_from_slice(arena.slice(self.payload_offset + start, first));

        if first < buf.len() {
            buf[first..].copy_from_slice(arena.slice(self.payload_offset, buf.len() - first));
        }
    }
}

pub struct DatagramChannel {
    pub(crate) client_to_server: RecordRing,
    pub(crate) server_to_client: RecordRing,
}

impl DatagramChannel {
    pub fn new(
        arena: Arc<Mutex<Arena>>,
        payload_capacity: usize,
        max_record_size: usize,
        max_records: usize,
        client_notifier: Arc<dyn Notifier>,
        server_notifier: Arc<dyn Notifier>,
    ) -> Result<Arc<Self>, Error> {
        Ok(Arc::new(Self {
            client_to_server: RecordRing::new(
                arena.clone(),
                payload_capacity,
                max_record_size,
                max_records,
                server_notifier.clone(),
                client_notifier.clone(),
            )?,
            server_to_client: RecordRing::new(
                arena,
                payload_capacity,
                max_record_size,
                max_records,
                client_notifier,
                server_notifier,
            )?,
        }))
    }
}

#[derive(Clone)]
pub struct ServerDatagramEnd(pub Arc<DatagramChannel>);

impl ServerDatagramEnd {
    pub fn send(&self, payload: &[u8], address: Option<Address>) -> bool {
        self.0.server_to_client.send(payload, address)
    }

    pub fn recv(&self) -> Option<(Vec<u8>, Option<Address>)> {
        self.0.client_to_server.recv()
    }
}

#[derive(Clone)]
pub struct ClientDatagramEnd(pub Arc<DatagramChannel>);

impl ClientDatagramEnd {
    pub fn send(&self, payload: &[u8], address: Option<Address>) -> bool {
        self.0.client_to_server.send(payload, address)
    }

    pub fn recv(&self) -> Option<(Vec<u8>, Option<Address>)> {
        self.0.server_to_client.recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CountingNotifier;

    fn setup() -> (ServerDatagramEnd, ClientDatagramEnd) {
        let arena = Arc::new(Mutex::new(Arena::new(1 << 16)));
        let channel = DatagramChannel::new(
            arena,
            4096,
            512,
            16,
            CountingNotifier::new(),
            CountingNotifier::new(),
        )
        .unwrap();

        (ServerDatagramEnd(channel.clone()), ClientDatagramEnd(channel))
    }

    #[test]
    fn record_boundaries_are_preserved() {
        let (server, client) = setup();

        assert!(client.send(b"first", None));
        assert!(client.send(b"second", None));

        let (first, _) = server.recv().unwrap();
        let (second, _) = server.recv().unwrap();

        assert_eq!(first, b"first");
        assert_eq!(second, b"second");
        assert!(server.recv().is_none());
    }

    #[test]
    fn oversized_record_is_rejected_without_partial_enqueue() {
        let (server, client) = setup();
        let huge = vec![0u8; 4096];

        assert!(!client.send(&huge, None));
        assert!(server.recv().is_none());
    }

    #[test]
    fn construction_rejects_record_larger_than_half_ring() {
        let arena = Arc::new(Mutex::new(Arena::new(1 << 16)));
        let result = DatagramChannel::new(
            arena,
            1024,
            600,
            8,
            CountingNotifier::new(),
            CountingNotifier::new(),
        );

        assert_eq!(result.err(), Some(Error::RecordTooLarge));
    }
}
