use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex as PlMutex;
use session::codec;
use session::error::Error;
use session::wire::{
    Domain, OptLevel, OptName, OptValue, Reply, Request, ShutdownHow, SockKind, SocketId, WireAddress,
};

const MAX_MESSAGE_LEN: usize = 256;

type Result<T> = std::result::Result<T, Error>;

fn io_to_internal(_: std::io::Error) -> Error {
    Error::Internal
}

/// One control-socket connection. Every [`Socket`] it returns shares
/// this connection; requests are serialized with an internal lock
/// since the protocol is strictly request-then-reply, not pipelined.
pub struct Client {
    stream: PlMutex<UnixStream>,
}

impl Client {
    pub fn connect(path: impl AsRef<Path>) -> std::io::Result<Arc<Self>> {
        let stream = UnixStream::connect(path)?;
        let client = Arc::new(Self { stream: PlMutex::new(stream) });
        client.call(Request::Init { base_address: 0 })?;
        log::debug!("connected to control socket at {}", path.as_ref().display());
        Ok(client)
    }

    fn call(self: &Arc<Self>, request: Request) -> Result<Reply> {
        let message = self.call_with_fds(request)?;
        Ok(message.0)
    }

    /// Sends `request` and waits for its reply, returning the reply
    /// body plus any ancillary file descriptors the server attached
    /// (only `Socket` and `Accept` replies carry any).
    fn call_with_fds(self: &Arc<Self>, request: Request) -> Result<(Reply, Option<(OwnedFd, OwnedFd)>)> {
        let stream = self.stream.lock();

        let mut buf = BytesMut::with_capacity(MAX_MESSAGE_LEN);
        codec::encode_request(&request, &mut buf);

        use std::io::Write;
        (&*stream).write_all(&buf).map_err(io_to_internal)?;

        recv_reply(&stream)
    }

    pub fn socket(self: &Arc<Self>, domain: Domain, kind: SockKind, protocol: i32) -> Result<Socket> {
        let (reply, fds) = self.call_with_fds(Request::Socket { domain, kind, protocol })?;
        let Reply::Socket(id) = reply else {
            return Err(as_error(reply));
        };
        Ok(Socket { client: self.clone(), id, channel_fds: fds })
    }
}

fn as_error(reply: Reply) -> Error {
    match reply {
        Reply::Error(error) => error,
        _ => Error::Invalid,
    }
}

#[cfg(target_os = "linux")]
fn recv_reply(stream: &UnixStream) -> Result<(Reply, Option<(OwnedFd, OwnedFd)>)> {
    use nix::sys::socket::{ControlMessageOwned, MsgFlags, UnixAddr, recvmsg};
    use std::io::IoSliceMut;
    use std::os::fd::{AsRawFd, FromRawFd};

    let mut buf = vec![0u8; MAX_MESSAGE_LEN];
    let mut iov = [IoSliceMut::new(&mut buf)];
    let mut cmsg_space = nix::cmsg_space!([std::os::fd::RawFd; 2]);

    let message =
        recvmsg::<UnixAddr>(stream.as_raw_fd(), &mut iov, Some(&mut cmsg_space), MsgFlags::empty())
            .map_err(|_| Error::Internal)?;

    let n = message.bytes;
    if n == 0 {
        return Err(Error::NotConn);
    }

    let mut fds = None;
    for cmsg in message.cmsgs().map_err(|_| Error::Internal)? {
        if let ControlMessageOwned::ScmRights(received) = cmsg {
            if received.len() == 2 {
                // SAFETY: the kernel just duplicated these descriptors into our
                // process's table via SCM_RIGHTS; we are their sole owner.
                fds = Some(unsafe {
                    (OwnedFd::from_raw_fd(received[0]), OwnedFd::from_raw_fd(received[1]))
                });
            }
        }
    }

    let mut cursor = bytes::Bytes::copy_from_slice(&buf[..n]);
    let reply = codec::decode_reply(&mut cursor).map_err(|_| Error::Invalid)?;
    Ok((reply, fds))
}

#[cfg(not(target_os = "linux"))]
fn recv_reply(stream: &UnixStream) -> Result<(Reply, Option<(OwnedFd, OwnedFd)>)> {
    use std::io::Read;

    let mut buf = vec![0u8; MAX_MESSAGE_LEN];
    let n = (&*stream).read(&mut buf).map_err(io_to_internal)?;
    if n == 0 {
        return Err(Error::NotConn);
    }

    let mut cursor = bytes::Bytes::copy_from_slice(&buf[..n]);
    let reply = codec::decode_reply(&mut cursor).map_err(|_| Error::Invalid)?;
    Ok((reply, None))
}

/// A socket handle obtained from [`Client::socket`] or [`Socket::accept`].
/// Every method blocks for exactly one request/reply round trip.
pub struct Socket {
    client: Arc<Client>,
    id: SocketId,
    channel_fds: Option<(OwnedFd, OwnedFd)>,
}

impl Socket {
    /// The (client-notifier, server-notifier) raw eventfd pair for
    /// this socket's shared-memory channel, if the server attached
    /// one: the client waits on the first and signals the second.
    /// Owned by this `Socket` — closed on drop.
    pub fn channel_fds(&self) -> Option<(std::os::fd::RawFd, std::os::fd::RawFd)> {
        use std::os::fd::AsRawFd;
        self.channel_fds.as_ref().map(|(a, b)| (a.as_raw_fd(), b.as_raw_fd()))
    }

    pub fn bind(&self, address: Option<SocketAddr>) -> Result<()> {
        let wire = address.map(to_wire_address);
        match self.client.call(Request::Bind { socket: self.id, address: wire })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }

    pub fn bind_link(&self, interface: u32, ethertype: u16) -> Result<()> {
        let wire = WireAddress::Link { interface, ethertype };
        match self.client.call(Request::Bind { socket: self.id, address: Some(wire) })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }

    pub fn connect(&self, address: SocketAddr) -> Result<()> {
        match self.client.call(Request::Connect { socket: self.id, address: to_wire_address(address) })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }

    pub fn listen(&self, backlog: i32) -> Result<()> {
        match self.client.call(Request::Listen { socket: self.id, backlog })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }

    pub fn accept(&self) -> Result<Socket> {
        let (reply, fds) = self.client.call_with_fds(Request::Accept { socket: self.id })?;
        let Reply::Socket(id) = reply else {
            return Err(as_error(reply));
        };
        Ok(Socket { client: self.client.clone(), id, channel_fds: fds })
    }

    pub fn shutdown(&self, how: ShutdownHow) -> Result<()> {
        match self.client.call(Request::Shutdown { socket: self.id, how })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }

    pub fn getsockname(&self) -> Result<Option<SocketAddr>> {
        match self.client.call(Request::GetSockName { socket: self.id })? {
            Reply::Address(address) => Ok(address.and_then(|a| a.as_socket_addr())),
            other => Err(as_error(other)),
        }
    }

    pub fn getpeername(&self) -> Result<Option<SocketAddr>> {
        match self.client.call(Request::GetPeerName { socket: self.id })? {
            Reply::Address(address) => Ok(address.and_then(|a| a.as_socket_addr())),
            other => Err(as_error(other)),
        }
    }

    pub fn getsockopt(&self, level: OptLevel, name: OptName) -> Result<OptValue> {
        match self.client.call(Request::GetSockOpt { socket: self.id, level, name })? {
            Reply::OptValue(value) => Ok(value),
            other => Err(as_error(other)),
        }
    }

    pub fn setsockopt(&self, level: OptLevel, name: OptName, value: OptValue) -> Result<()> {
        match self.client.call(Request::SetSockOpt { socket: self.id, level, name, value })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }

    pub fn close(self) -> Result<()> {
        match self.client.call(Request::Close { socket: self.id })? {
            Reply::Ok => Ok(()),
            other => Err(as_error(other)),
        }
    }
}

fn to_wire_address(address: SocketAddr) -> WireAddress {
    match address {
        SocketAddr::V4(addr) => WireAddress::V4(addr),
        SocketAddr::V6(addr) => WireAddress::V6(addr),
    }
}
