//! The `NetStack` trait and the dedicated stack thread that owns the
//! one implementation of it, taking submitted work over a
//! submit-and-wait message queue (spec §4.5).

use std::net::SocketAddr;
use std::sync::mpsc;

use fib::{InterfaceId, PortId};

use crate::arp::{ArpCache, NdCache};
use crate::config::InterfaceConfig;
use crate::error::Error;
use crate::extension::ExtensionMap;
use crate::pcb::{PcbId, PcbKind};

/// The external TCP/IP stack's contract: per-interface lifecycle, PCB
/// lifecycle, and queryable ARP/ND caches. All of it is meant to run
/// exclusively on the stack thread — the trait itself is `!Sync` in
/// spirit even though Rust cannot express that; `StackThread` is the
/// only thing that is allowed to hold a `Box<dyn NetStack>`.
pub trait NetStack: Send {
    fn add_interface(&mut self, config: InterfaceConfig, port: PortId, mac: [u8; 6]) -> Result<InterfaceId, Error>;
    fn remove_interface(&mut self, interface: InterfaceId) -> Result<(), Error>;
    fn set_up(&mut self, interface: InterfaceId) -> Result<(), Error>;
    fn set_down(&mut self, interface: InterfaceId) -> Result<(), Error>;
    fn set_link_up(&mut self, interface: InterfaceId) -> Result<(), Error>;
    fn set_link_down(&mut self, interface: InterfaceId) -> Result<(), Error>;
    fn input(&mut self, interface: InterfaceId, frame: Vec<u8>) -> Result<(), Error>;

    fn pcb_new(&mut self, kind: PcbKind) -> PcbId;
    fn pcb_bind(&mut self, pcb: PcbId, addr: SocketAddr) -> Result<(), Error>;
    fn pcb_connect(&mut self, pcb: PcbId, addr: SocketAddr) -> Result<(), Error>;
    fn pcb_listen(&mut self, pcb: PcbId, backlog: usize) -> Result<(), Error>;
    fn pcb_accept(&mut self, pcb: PcbId) -> Result<Option<PcbId>, Error>;
    fn pcb_send(&mut self, pcb: PcbId, data: &[u8]) -> Result<usize, Error>;
    fn pcb_recv(&mut self, pcb: PcbId, max: usize) -> Result<Vec<u8>, Error>;
    fn pcb_close(&mut self, pcb: PcbId) -> Result<(), Error>;

    fn arp(&mut self) -> &mut ArpCache;
    fn nd(&mut self) -> &mut NdCache;
    fn extensions(&mut self) -> &mut ExtensionMap;
}

type Command = Box<dyn FnOnce(&mut dyn NetStack) + Send>;

/// Owns the stack exclusively on one OS thread. Every other thread
/// talks to it through [`StackHandle::submit`], which blocks the
/// caller until the stack thread has run the closure and sent the
/// result back.
pub struct StackThread {
    sender: mpsc::Sender<Command>,
    join: Option<std::thread::JoinHandle<()>>,
}

#[derive(Clone)]
pub struct StackHandle {
    sender: mpsc::Sender<Command>,
}

impl StackThread {
    pub fn spawn(mut stack: Box<dyn NetStack>) -> (Self, StackHandle) {
        let (sender, receiver) = mpsc::channel::<Command>();
        let handle_sender = sender.clone();

        let join = std::thread::Builder::new()
            .name("openperf-stack".into())
            .spawn(move || {
                for command in receiver {
                    command(stack.as_mut());
                }
            })
            .expect("failed to spawn stack thread");

        (
            Self {
                sender,
                join: Some(join),
            },
            StackHandle { sender: handle_sender },
        )
    }

    /// Drops the command sender (so the stack thread's `for` loop ends)
    /// and joins it.
    pub fn shutdown(mut self) {
        drop(std::mem::replace(&mut self.sender, mpsc::channel().0));
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl StackHandle {
    /// Submits `f` to run on the stack thread and blocks until it has
    /// run, returning its result. This is the "message queue whose
    /// deliveries block the submitter until the stack thread acks"
    /// from spec §4.5.
    pub fn submit<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn NetStack) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        let command: Command = Box::new(move |stack| {
            let _ = reply_tx.send(f(stack));
        });

        self.sender.send(command).map_err(|_| Error::StackThreadGone)?;
        reply_rx.recv().map_err(|_| Error::StackThreadGone)
    }
}
