//! Root orchestration: wires the seven components together and runs
//! the control thread (spec §5's three thread kinds — worker, stack,
//! control). Shaped after the teacher's `turn-server::startup`:
//! construct the shared state, hand it to the transport, block.

pub mod config;
pub mod error;

use std::sync::Arc;

use arena::Arena;
use fib::Directory;
use log::info;
use netstack::{LoopbackStack, StackThread};
use parking_lot::Mutex;
use runtime::{LoopMode, Worker};

use crate::config::Config;

/// Starts every component and runs the control thread's accept loop.
/// Returns only if the control socket fails to bind or its accept loop
/// errors; a healthy process blocks here for its whole lifetime.
pub fn startup(config: Config) -> anyhow::Result<()> {
    let arena = Arc::new(Mutex::new(Arena::new(config.runtime.arena_size)));
    let directory = Arc::new(Directory::new());

    let (stack_thread, stack_handle) = StackThread::spawn(Box::new(LoopbackStack::new()));

    // No real RX/TX hardware backend exists in this workspace (`RxQueue`
    // and `TxNic` are traits with only `#[cfg(test)]` doubles — see
    // `DESIGN.md`'s worker-pool entry): a production build would hand
    // each worker its port's RX/TX queue tasks here. This reference
    // build starts an idle pool sized to `worker_count` so the pinning
    // and quiescence machinery (spec §4.4, §4.3) is live and ready for
    // tasks a real driver integration would add, without inventing an
    // ungrounded fake NIC to fill them.
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    let mut worker_handles = Vec::with_capacity(config.runtime.worker_count);
    for index in 0..config.runtime.worker_count {
        let core = core_ids.get(index).copied();
        let worker = Worker::new(format!("w{index}"), core, Vec::new(), directory.clone(), LoopMode::Spinning);
        worker_handles.push(runtime::worker::spawn(worker));
    }
    info!("started {} worker thread(s)", worker_handles.len());

    let server = session::Server::bind(&config.runtime.control_socket_path, arena, stack_handle)?;
    info!("control socket bound at {}", config.runtime.control_socket_path.display());

    server.serve()?;

    stack_thread.shutdown();
    for handle in worker_handles {
        let _ = handle.join();
    }

    Ok(())
}
