use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use arena::Arena;
use parking_lot::Mutex;

use crate::notify::Notifier;

/// One direction of a byte ring: exactly one writer, exactly one reader.
pub struct ByteRing {
    arena: Arc<Mutex<Arena>>,
    offset: usize,
    capacity: u64,

    head: AtomicU64,
    tail: AtomicU64,

    shut_rd: AtomicBool,
    shut_wr: AtomicBool,
    error: AtomicI32,
    nonblocking: AtomicBool,

    reader_wait: AtomicBool,
    writer_wait: AtomicBool,

    reader_notifier: Arc<dyn Notifier>,
    writer_notifier: Arc<dyn Notifier>,
}

impl ByteRing {
    pub fn new(
        arena: Arc<Mutex<Arena>>,
        capacity: usize,
        reader_notifier: Arc<dyn Notifier>,
        writer_notifier: Arc<dyn Notifier>,
    ) -> Result<Self, arena::Error> {
        let offset = arena.lock().reserve(capacity)?;

        Ok(Self {
            arena,
            offset,
            capacity: capacity as u64,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            shut_rd: AtomicBool::new(false),
            shut_wr: AtomicBool::new(false),
            error: AtomicI32::new(0),
            nonblocking: AtomicBool::new(false),
            reader_wait: AtomicBool::new(false),
            writer_wait: AtomicBool::new(false),
            reader_notifier,
            writer_notifier,
        })
    }

    pub fn set_nonblocking(&self, value: bool) {
        self.nonblocking.store(value, Ordering::Relaxed);
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Relaxed)
    }

    pub fn set_error(&self, code: i32) {
        self.error.store(code, Ordering::Relaxed);
    }

    pub fn error(&self) -> i32 {
        self.error.load(Ordering::Relaxed)
    }

    /// Copies up to `buf.len()` bytes into the ring, returning how many
    /// were accepted. Returns `buf.len()` (discarding the data) once the
    /// receive side has half-closed; returns `0` once the local side has
    /// half-closed its own write direction.
    pub fn write(&self, buf: &[u8]) -> usize {
        if self.shut_rd.load(Ordering::Acquire) {
            return buf.len();
        }

        if self.shut_wr.load(Ordering::Acquire) {
            return 0;
        }

        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let used = tail - head;
        let free = self.capacity - used;
        let n = free.min(buf.len() as u64) as usize;

        if n == 0 {
            self.writer_wait.store(true, Ordering::Release);
            return 0;
        }

        self.copy_in(tail, &buf[..n]);
        self.tail.store(tail + n as u64, Ordering::Release);

        if used == 0 {
            if self.reader_wait.swap(false, Ordering::AcqRel) {
                self.reader_notifier.notify();
            }
        }

        n
    }

    /// Copies up to `buf.len()` bytes out of the ring. A `0` return with
    /// the write side half-closed means end-of-file; a `0` return
    /// otherwise means the ring is empty and the reader's wait flag has
    /// been armed.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let used = tail - head;

        if used == 0 {
            if self.shut_wr.load(Ordering::Acquire) {
                return 0;
            }

            self.reader_wait.store(true, Ordering::Release);
            return 0;
        }

        let n = used.min(buf.len() as u64) as usize;
        self.copy_out(head, &mut buf[..n]);
        self.head.store(head + n as u64, Ordering::Release);

        if used == self.capacity {
            if self.writer_wait.swap(false, Ordering::AcqRel) {
                self.writer_notifier.notify();
            }
        }

        n
    }

    pub fn shutdown_rd(&self) {
        self.shut_rd.store(true, Ordering::Release);
    }

    /// Forbids further writes; once the ring drains, readers observe EOF.
    /// Wakes a blocked reader immediately so it can re-check for EOF.
    pub fn shutdown_wr(&self) {
        self.shut_wr.store(true, Ordering::Release);

        if self.reader_wait.swap(false, Ordering::AcqRel) {
            self.reader_notifier.notify();
        }
    }

    pub fn is_eof(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);

        self.shut_wr.load(Ordering::Acquire) && head == tail
    }

    fn copy_in(&self, tail: u64, buf: &[u8]) {
        let mut arena = self.arena.lock();
        let capacity = self.capacity as usize;
        let start = (tail % self.capacity) as usize;
        let first = buf.len().min(capacity - start);

        arena.slice_mut(self.offset + start, first).copy_from_slice(&buf[..first]);

        if first < buf.len() {
            arena
                .slice_mut(self.offset, buf.len() - first)
                .copy_from_slice(&buf[first..]);
        }
    }

    fn copy_out(&self, head: u64, buf: &mut [u8]) {
        let arena = self.arena.lock();
        let capacity = self.capacity as usize;
        let start = (head % self.capacity) as usize;
        let first = buf.len().min(capacity - start);

        buf[..first].copy_from_slice(arena.slice(self.offset + start, first));

        if first < buf.len() {
            buf[first..].copy_from_slice(arena.slice(self.offset, buf.len() - first));
        }
    }
}

/// A full-duplex channel: one `ByteRing` per direction, plus the pair of
/// one-shot wakeup notifiers each side owns.
pub struct StreamChannel {
    pub(crate) client_to_server: ByteRing,
    pub(crate) server_to_client: ByteRing,
}

impl StreamChannel {
    pub fn new(
        arena: Arc<Mutex<Arena>>,
        capacity: usize,
        client_notifier: Arc<dyn Notifier>,
        server_notifier: Arc<dyn Notifier>,
    ) -> Result<Arc<Self>, arena::Error> {
        Ok(Arc::new(Self {
            client_to_server: ByteRing::new(
                arena.clone(),
                capacity,
                server_notifier.clone(),
                client_notifier.clone(),
            )?,
            server_to_client: ByteRing::new(arena, capacity, client_notifier, server_notifier)?,
        }))
    }
}

/// The socket server's view of a [`StreamChannel`]: writes go to the
/// client, reads come from the client.
#[derive(Clone)]
pub struct ServerStreamEnd(pub Arc<StreamChannel>);

impl ServerStreamEnd {
    pub fn write(&self, buf: &[u8]) -> usize {
        self.0.server_to_client.write(buf)
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.0.client_to_server.read(buf)
    }

    pub fn shutdown_rd(&self) {
        self.0.client_to_server.shutdown_rd();
    }

    pub fn shutdown_wr(&self) {
        self.0.server_to_client.shutdown_wr();
    }
}

/// The client shim's view of a [`StreamChannel`]: mirrored relative to the
/// server's.
#[derive(Clone)]
pub struct ClientStreamEnd(pub Arc<StreamChannel>);

impl ClientStreamEnd {
    pub fn write(&self, buf: &[u8]) -> usize {
        self.0.client_to_server.write(buf)
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.0.server_to_client.read(buf)
    }

    pub fn shutdown_rd(&self) {
        self.0.server_to_client.shutdown_rd();
    }

    pub fn shutdown_wr(&self) {
        self.0.client_to_server.shutdown_wr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CountingNotifier;

    fn setup(capacity: usize) -> (ServerStreamEnd, ClientStreamEnd, Arc<CountingNotifier>, Arc<CountingNotifier>) {
        let arena = Arc::new(Mutex::new(Arena::new(1 << 16)));
        let client_notifier = CountingNotifier::new();
        let server_notifier = CountingNotifier::new();

        let channel = StreamChannel::new(
            arena,
            capacity,
            client_notifier.clone(),
            server_notifier.clone(),
        )
        .unwrap();

        (
            ServerStreamEnd(channel.clone()),
            ClientStreamEnd(channel),
            client_notifier,
            server_notifier,
        )
    }

    #[test]
    fn write_then_read_yields_prefix() {
        let (server, client, _, _) = setup(64);

        assert_eq!(client.write(b"hello "), 6);
        assert_eq!(client.write(b"world!"), 6);

        let mut buf = [0u8; 12];
        let n = server.read(&mut buf);
        assert_eq!(&buf[..n], b"hello world!");
    }

    #[test]
    fn empty_read_arms_reader_wait_and_notify_fires_once() {
        let (server, client, _, server_notifier) = setup(8);

        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf), 0);

        assert_eq!(client.write(b"hi"), 2);
        assert_eq!(server_notifier.count(), 1);
    }

    #[test]
    fn half_close_signals_eof() {
        let (server, client, _, _) = setup(8);

        client.write(b"ab");
        client.shutdown_wr();

        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf), 2);
        assert_eq!(server.read(&mut buf), 0);
        assert!(server.0.client_to_server.is_eof());
    }

    #[test]
    fn shut_rd_discards_writes() {
        let (_server, client, _, _) = setup(8);

        client.0.server_to_client.shutdown_rd();
        assert_eq!(client.0.server_to_client.write(b"xx"), 2);
    }
}
