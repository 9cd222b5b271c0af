//! The Unix control socket transport (spec §4.6): accepts one
//! connection per client process, runs a [`Handler`] for its
//! lifetime, and carries channel file descriptors out-of-band as
//! `SCM_RIGHTS` ancillary data riding on each `Socket`/`Accept` reply.

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use arena::Arena;
use bytes::BytesMut;
use log::{debug, info, warn};
use netstack::StackHandle;
use parking_lot::Mutex;

use crate::codec;
use crate::handler::Handler;
use crate::wire::ReplyMessage;

/// Large enough for every `Request`/`Reply` variant `codec.rs` encodes;
/// the union's biggest member is `SetSockOpt` with an `IcmpFilter`
/// payload, well under this.
const MAX_MESSAGE_LEN: usize = 256;

pub struct Server {
    listener: UnixListener,
    arena: Arc<Mutex<Arena>>,
    stack: StackHandle,
    next_pid: AtomicI32,
}

impl Server {
    pub fn bind(path: impl AsRef<Path>, arena: Arc<Mutex<Arena>>, stack: StackHandle) -> std::io::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        Ok(Self {
            listener: UnixListener::bind(path)?,
            arena,
            stack,
            next_pid: AtomicI32::new(1),
        })
    }

    /// Accepts connections forever, spawning one thread per client.
    /// Each thread owns its [`Handler`] exclusively; nothing here is
    /// shared across clients except the arena and the stack handle,
    /// both of which are `Send + Sync` by construction.
    pub fn serve(self) -> std::io::Result<()> {
        info!("socket server listening");
        loop {
            let (stream, _addr) = self.listener.accept()?;
            let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
            let arena = self.arena.clone();
            let stack = self.stack.clone();

            std::thread::Builder::new()
                .name(format!("openperf-client-{pid}"))
                .spawn(move || serve_client(pid, stream, arena, stack))
                .expect("failed to spawn client handler thread");
        }
    }
}

/// How long the companion pump thread sleeps between idle polls of a
/// client's open channels (spec §4.4's spinning-loop poll, scaled down
/// since this reference server has no dedicated worker to spin on).
const PUMP_IDLE_BACKOFF: Duration = Duration::from_millis(1);

fn serve_client(pid: i32, stream: UnixStream, arena: Arc<Mutex<Arena>>, stack: StackHandle) {
    let handler = Arc::new(Mutex::new(Handler::new(pid, arena, stack)));
    debug!("client {pid} connected");

    let stop = Arc::new(AtomicBool::new(false));
    let pump_handler = handler.clone();
    let pump_stop = stop.clone();
    let pump_thread = std::thread::Builder::new()
        .name(format!("openperf-pump-{pid}"))
        .spawn(move || {
            while !pump_stop.load(Ordering::Relaxed) {
                let active = pump_handler.lock().service_channels();
                if active == 0 {
                    std::thread::sleep(PUMP_IDLE_BACKOFF);
                }
            }
        })
        .expect("failed to spawn channel pump thread");

    loop {
        let request = match recv_request(&stream) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(error) => {
                warn!("client {pid}: malformed request: {error}");
                break;
            }
        };

        let reply = handler.lock().handle(request);
        if send_reply(&stream, &reply).is_err() {
            break;
        }
    }

    stop.store(true, Ordering::Relaxed);
    pump_thread.join().expect("channel pump thread panicked");
    handler.lock().close_all();
    debug!("client {pid} disconnected");
}

#[cfg(target_os = "linux")]
fn recv_request(stream: &UnixStream) -> std::io::Result<Option<crate::wire::Request>> {
    use std::io::Read;

    let mut buf = vec![0u8; MAX_MESSAGE_LEN];
    let n = (&*stream).read(&mut buf)?;
    if n == 0 {
        return Ok(None);
    }

    let mut cursor = bytes::Bytes::copy_from_slice(&buf[..n]);
    codec::decode_request(&mut cursor)
        .map(Some)
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidData, error))
}

#[cfg(not(target_os = "linux"))]
fn recv_request(_stream: &UnixStream) -> std::io::Result<Option<crate::wire::Request>> {
    Ok(None)
}

#[cfg(target_os = "linux")]
fn send_reply(stream: &UnixStream, reply: &ReplyMessage) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{ControlMessage, MsgFlags, UnixAddr, sendmsg};
    use std::io::IoSlice;

    let mut buf = BytesMut::with_capacity(MAX_MESSAGE_LEN);
    codec::encode_reply(&reply.body, &mut buf);
    let iov = [IoSlice::new(&buf)];

    if let Some((client_fd, server_fd)) = reply.fds {
        let fds = [client_fd, server_fd];
        let cmsg = [ControlMessage::ScmRights(&fds)];
        sendmsg::<UnixAddr>(stream.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
    } else {
        sendmsg::<UnixAddr>(stream.as_raw_fd(), &iov, &[], MsgFlags::empty(), None)
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn send_reply(_stream: &UnixStream, _reply: &ReplyMessage) -> std::io::Result<()> {
    Ok(())
}
