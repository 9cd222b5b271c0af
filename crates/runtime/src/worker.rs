//! Pinned worker threads and the two event loop flavors (spec §4.4).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fib::{Directory, WorkerId};
use log::{debug, warn};

use crate::task::Task;

/// One worker's disjoint set of tasks, plus the directory handle it
/// declares quiescence against once per outer poll iteration.
pub struct Worker {
    name: String,
    core: Option<core_affinity::CoreId>,
    tasks: Vec<Box<dyn Task>>,
    directory: Arc<Directory>,
    worker_id: WorkerId,
    running: Arc<AtomicBool>,
    mode: LoopMode,
}

/// Which event loop a worker runs. `Pollable` requires every task to
/// expose a notifier with a raw fd; `Spinning` is used whenever at
/// least one RX queue does not support interrupt notification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoopMode {
    Pollable,
    Spinning,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        core: Option<core_affinity::CoreId>,
        tasks: Vec<Box<dyn Task>>,
        directory: Arc<Directory>,
        mode: LoopMode,
    ) -> Self {
        let worker_id = directory.register_worker();
        Self {
            name: name.into(),
            core,
            tasks,
            directory,
            worker_id,
            running: Arc::new(AtomicBool::new(true)),
            mode,
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Pins the calling thread to this worker's core (if one was
    /// assigned) and runs the selected event loop until `stop_handle`
    /// is cleared.
    pub fn run(mut self) {
        if let Some(core) = self.core {
            let _ = core_affinity::set_for_current(core);
        }

        debug!("worker {} starting in {:?} mode with {} tasks", self.name, self.mode, self.tasks.len());

        match self.mode {
            LoopMode::Pollable => self.run_pollable(),
            LoopMode::Spinning => self.run_spinning(),
        }
    }

    fn mark_quiescent(&self) {
        self.directory.mark_quiescent(self.worker_id);
    }

    fn run_spinning(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            for task in &mut self.tasks {
                if task.poll_ready() {
                    task.service();
                }
            }
            self.mark_quiescent();
        }
    }

    #[cfg(target_os = "linux")]
    fn run_pollable(&mut self) {
        use nix::poll::{PollFd, PollFlags, PollTimeout};
        use std::os::fd::BorrowedFd;

        while self.running.load(Ordering::Relaxed) {
            let fds: Vec<Option<std::os::fd::RawFd>> = self.tasks.iter().map(|t| t.notifier().and_then(|n| n.raw_fd())).collect();

            let borrowed: Vec<Option<BorrowedFd<'_>>> =
                fds.iter().map(|fd| fd.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) })).collect();

            let mut pollfds: Vec<PollFd> = borrowed
                .iter()
                .filter_map(|fd| fd.as_ref().map(|fd| PollFd::new(*fd, PollFlags::POLLIN)))
                .collect();

            if pollfds.is_empty() {
                // No fd-backed tasks registered (e.g. all-callback
                // worker in a test harness): fall back to spinning this
                // iteration rather than blocking forever.
                for task in &mut self.tasks {
                    if task.poll_ready() {
                        task.service();
                    }
                }
                self.mark_quiescent();
                continue;
            }

            let timeout = PollTimeout::from(100u16);
            match nix::poll::poll(&mut pollfds, timeout) {
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    warn!("worker {} poll failed: {err}", self.name);
                    continue;
                }
            }

            for task in &mut self.tasks {
                if task.poll_ready() {
                    task.service();
                }
            }

            self.mark_quiescent();
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn run_pollable(&mut self) {
        // No epoll/eventfd on this platform: degrade to a bounded-sleep
        // spin, which is correct (if less efficient) everywhere.
        while self.running.load(Ordering::Relaxed) {
            for task in &mut self.tasks {
                if task.poll_ready() {
                    task.service();
                }
            }
            std::thread::sleep(Duration::from_micros(100));
            self.mark_quiescent();
        }
    }
}

/// Spawns `worker.run()` on a dedicated OS thread pinned (when a core is
/// assigned) for the lifetime of the worker.
pub fn spawn(worker: Worker) -> std::thread::JoinHandle<()> {
    let name = format!("openperf-worker-{}", worker.name);
    std::thread::Builder::new()
        .name(name)
        .spawn(move || worker.run())
        .expect("failed to spawn worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    struct CountingTask {
        count: Arc<std::sync::atomic::AtomicUsize>,
        remaining: usize,
    }

    impl Task for CountingTask {
        fn label(&self) -> &str {
            "counting"
        }

        fn poll_ready(&mut self) -> bool {
            self.remaining > 0
        }

        fn service(&mut self) {
            self.remaining -= 1;
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn spinning_loop_services_ready_tasks_until_stopped() {
        let directory = Arc::new(Directory::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let task = CountingTask {
            count: count.clone(),
            remaining: 5,
        };

        let worker = Worker::new("test", None, vec![Box::new(task)], directory, LoopMode::Spinning);
        let running = worker.stop_handle();

        let handle = spawn(worker);

        while count.load(Ordering::Relaxed) < 5 {
            std::thread::yield_now();
        }
        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 5);
    }
}
