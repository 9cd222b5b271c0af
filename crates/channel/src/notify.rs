//! Wakeup primitives.
//!
//! Each side of a channel owns one edge-triggered notifier. A producer
//! signals the peer's notifier only when the peer's wait flag says it is
//! (or is about to be) blocked, and only once per empty-to-nonempty or
//! full-to-nonfull transition.

use std::sync::Arc;

pub trait Notifier: Send + Sync {
    /// Raises the notifier exactly once. Idempotent with respect to a
    /// single pending wakeup: repeated calls before the peer observes the
    /// first one must not be required to be individually delivered.
    fn notify(&self);

    /// Blocks the calling thread until the notifier has been raised since
    /// the last `wait`, then clears it.
    fn wait(&self);

    /// The underlying OS-level descriptor, for notifiers that have one.
    /// A worker's pollable loop multiplexes over these; `None` means the
    /// notifier can only be driven by direct `wait` calls (the test
    /// `CountingNotifier`), which a pollable loop has no use for.
    fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        None
    }
}

/// Production backend: a Linux `eventfd(2)` counter, the "kernel-notifiable
/// counter" the data model calls for.
#[cfg(target_os = "linux")]
pub struct EventFdNotifier {
    fd: nix::sys::eventfd::EventFd,
}

#[cfg(target_os = "linux")]
impl EventFdNotifier {
    pub fn new() -> std::io::Result<Self> {
        use nix::sys::eventfd::{EventFd, EfdFlags};

        Ok(Self {
            fd: EventFd::from_flags(EfdFlags::EFD_NONBLOCK)?,
        })
    }

    pub fn raw_fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;
        self.fd.as_raw_fd()
    }
}

#[cfg(target_os = "linux")]
impl Notifier for EventFdNotifier {
    fn notify(&self) {
        use std::io::Write;
        use std::os::fd::AsRawFd;

        let mut file = unsafe {
            <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(self.fd.as_raw_fd())
        };

        let _ = file.write_all(&1u64.to_ne_bytes());
        std::mem::forget(file);
    }

    fn wait(&self) {
        use std::io::Read;
        use std::os::fd::AsRawFd;

        loop {
            let mut file = unsafe {
                <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(self.fd.as_raw_fd())
            };

            let mut buf = [0u8; 8];
            let result = file.read_exact(&mut buf);
            std::mem::forget(file);

            if result.is_ok() {
                return;
            }

            std::thread::yield_now();
        }
    }

    fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        Some(self.raw_fd())
    }
}

/// Test/in-process backend: an `AtomicUsize` counter paired with a
/// `Condvar`, used wherever a real file descriptor would be overkill (unit
/// tests, the loopback netstack backend).
#[derive(Default)]
pub struct CountingNotifier {
    inner: parking_lot::Mutex<u64>,
    condvar: parking_lot::Condvar,
}

impl CountingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> u64 {
        *self.inner.lock()
    }
}

impl Notifier for CountingNotifier {
    fn notify(&self) {
        let mut guard = self.inner.lock();
        *guard += 1;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut guard = self.inner.lock();
        if *guard > 0 {
            *guard -= 1;
            return;
        }

        self.condvar.wait(&mut guard);
        if *guard > 0 {
            *guard -= 1;
        }
    }
}
