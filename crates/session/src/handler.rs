//! The per-client handler (spec §4.6): one of these owns every socket
//! a single connected client has open, dispatching each wire
//! [`Request`] to a PCB operation on the stack thread and a transition
//! on the matching [`Socket`] state machine. `server.rs` spawns one
//! handler per accepted control-socket connection; this module has no
//! knowledge of the transport those requests arrived over.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arena::Arena;
use channel::notify::Notifier;
use channel::{ClientDatagramEnd, ClientStreamEnd, DatagramChannel, ServerDatagramEnd, ServerStreamEnd, StreamChannel};
use netstack::{PcbKind, StackHandle};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::options;
use crate::ports::PortAllocator;
use crate::pump::{PumpChannel, SocketPump};
use crate::socket::{Socket, SocketChannel, SocketKind};
use crate::wire::{Domain, OptLevel, OptName, Reply, ReplyMessage, Request, SockKind, SocketId, WireAddress};

const STREAM_RING_CAPACITY: usize = 64 * 1024;
const DATAGRAM_PAYLOAD_CAPACITY: usize = 256 * 1024;
const DATAGRAM_MAX_RECORD_SIZE: usize = 65_535;
const DATAGRAM_MAX_RECORDS: usize = 1024;

fn socket_kind(domain: Domain, kind: SockKind) -> Result<SocketKind> {
    match (domain, kind) {
        (Domain::Inet | Domain::Inet6, SockKind::Stream) => Ok(SocketKind::Tcp),
        (Domain::Inet | Domain::Inet6, SockKind::Dgram) => Ok(SocketKind::Udp),
        (Domain::Inet | Domain::Inet6, SockKind::Raw) => Ok(SocketKind::Raw),
        (Domain::Packet, SockKind::Packet) => Ok(SocketKind::Packet),
        _ => Err(Error::Invalid),
    }
}

fn pcb_kind(kind: SocketKind) -> PcbKind {
    match kind {
        SocketKind::Raw | SocketKind::Icmp => PcbKind::Raw,
        SocketKind::Udp => PcbKind::Udp,
        SocketKind::Tcp => PcbKind::Tcp,
        SocketKind::Packet => PcbKind::Packet,
    }
}

fn wire_to_socket_addr(address: WireAddress) -> Result<SocketAddr> {
    address.as_socket_addr().ok_or(Error::Invalid)
}

fn socket_addr_to_wire(address: SocketAddr) -> WireAddress {
    match address {
        SocketAddr::V4(addr) => WireAddress::V4(addr),
        SocketAddr::V6(addr) => WireAddress::V6(addr),
    }
}

fn is_wildcard(address: &WireAddress) -> bool {
    match address {
        WireAddress::V4(addr) => addr.ip().is_unspecified() && addr.port() == 0,
        WireAddress::V6(addr) => addr.ip().is_unspecified() && addr.port() == 0,
        WireAddress::Link { .. } => false,
    }
}

fn wildcard_addr(port: u16, v6: bool) -> SocketAddr {
    if v6 {
        SocketAddr::V6(SocketAddrV6::new(std::net::Ipv6Addr::UNSPECIFIED, port, 0, 0))
    } else {
        SocketAddr::V4(SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port))
    }
}

/// A pair of notifiers plus the raw fd each side of a new channel hands
/// to its peer. On non-Linux targets the fds are always `None`; the
/// handler still functions in-process (used by tests).
struct ChannelEndpoint {
    client_fd: i32,
    server_fd: i32,
    client_notifier: Arc<dyn Notifier>,
    server_notifier: Arc<dyn Notifier>,
}

#[cfg(target_os = "linux")]
fn make_notifier_pair() -> std::io::Result<(Arc<dyn Notifier>, Arc<dyn Notifier>, i32, i32)> {
    use channel::notify::EventFdNotifier;

    let client = EventFdNotifier::new()?;
    let server = EventFdNotifier::new()?;
    let client_fd = client.raw_fd();
    let server_fd = server.raw_fd();
    Ok((Arc::new(client), Arc::new(server), client_fd, server_fd))
}

#[cfg(not(target_os = "linux"))]
fn make_notifier_pair() -> std::io::Result<(Arc<dyn Notifier>, Arc<dyn Notifier>, i32, i32)> {
    use channel::notify::CountingNotifier;
    Ok((CountingNotifier::new(), CountingNotifier::new(), -1, -1))
}

fn channel_endpoint() -> std::io::Result<ChannelEndpoint> {
    let (client_notifier, server_notifier, client_fd, server_fd) = make_notifier_pair()?;
    Ok(ChannelEndpoint { client_fd, server_fd, client_notifier, server_notifier })
}

/// Everything one connected client owns: its sockets, its ephemeral
/// port pool, and the serial counter minting the client half of each
/// [`SocketId`].
pub struct Handler {
    pid: i32,
    next_serial: AtomicU64,
    arena: Arc<Mutex<Arena>>,
    stack: StackHandle,
    ports: PortAllocator,
    sockets: HashMap<SocketId, Socket>,
    pumps: HashMap<SocketId, SocketPump>,
}

impl Handler {
    pub fn new(pid: i32, arena: Arc<Mutex<Arena>>, stack: StackHandle) -> Self {
        Self {
            pid,
            next_serial: AtomicU64::new(1),
            arena,
            stack,
            ports: PortAllocator::default(),
            sockets: HashMap::new(),
            pumps: HashMap::new(),
        }
    }

    /// Drives every open socket's pump once (spec §2 data-plane flow).
    /// Returns the number of pumps that moved at least one byte or
    /// record, so a caller polling in a loop can back off when idle.
    pub fn service_channels(&mut self) -> usize {
        let mut active = 0;
        for pump in self.pumps.values() {
            if pump.pump_send(&self.stack) > 0 {
                active += 1;
            }
            if pump.pump_recv(&self.stack) > 0 {
                active += 1;
            }
        }
        active
    }

    fn new_id(&self) -> SocketId {
        (self.pid, self.next_serial.fetch_add(1, Ordering::Relaxed))
    }

    fn socket_mut(&mut self, id: SocketId) -> Result<&mut Socket> {
        self.sockets.get_mut(&id).ok_or(Error::NotFound)
    }

    fn socket(&self, id: SocketId) -> Result<&Socket> {
        self.sockets.get(&id).ok_or(Error::NotFound)
    }

    /// Tears down every open socket, releasing ports and PCBs. Called
    /// when the client's control-socket connection drops.
    pub fn close_all(&mut self) {
        let ids: Vec<SocketId> = self.sockets.keys().copied().collect();
        for id in ids {
            let _ = self.handle(Request::Close { socket: id });
        }
    }

    pub fn handle(&mut self, request: Request) -> ReplyMessage {
        match request {
            Request::Init { .. } => ReplyMessage::ok(),
            Request::Socket { domain, kind, protocol } => {
                self.do_socket(domain, kind, protocol).unwrap_or_else(ReplyMessage::error)
            }
            Request::Bind { socket, address } => self.do_bind(socket, address).into(),
            Request::Listen { socket, backlog } => self.do_listen(socket, backlog).into(),
            Request::Accept { socket } => self.do_accept(socket).unwrap_or_else(ReplyMessage::error),
            Request::Connect { socket, address } => self.do_connect(socket, address).into(),
            Request::Shutdown { socket, how: _ } => self.do_shutdown(socket).into(),
            Request::GetSockName { socket } => self.do_getsockname(socket).into(),
            Request::GetPeerName { socket } => self.do_getpeername(socket).into(),
            Request::GetSockOpt { socket, level, name } => self.do_getsockopt(socket, level, name).into(),
            Request::SetSockOpt { socket, level, name, value } => {
                self.do_setsockopt(socket, level, name, value).into()
            }
            Request::Ioctl { socket, request, arg } => self.do_ioctl(socket, request, arg).into(),
            Request::Close { socket } => self.do_close(socket).into(),
        }
    }

    fn do_socket(&mut self, domain: Domain, kind: SockKind, protocol: i32) -> Result<ReplyMessage> {
        let socket_kind = socket_kind(domain, kind)?;
        let socket_kind = if socket_kind == SocketKind::Raw && protocol == 1 {
            SocketKind::Icmp
        } else {
            socket_kind
        };

        let pcb = self
            .stack
            .submit(move |stack| stack.pcb_new(pcb_kind(socket_kind)))
            .map_err(Error::from)?;

        let id = self.new_id();
        let mut socket = Socket::new(id, socket_kind, pcb);

        let endpoint = channel_endpoint().map_err(|_| Error::Internal)?;
        let pump = if socket_kind == SocketKind::Tcp {
            let channel = StreamChannel::new(
                self.arena.clone(),
                STREAM_RING_CAPACITY,
                endpoint.client_notifier,
                endpoint.server_notifier,
            )
            .map_err(Error::from)?;
            let server = ServerStreamEnd(channel.clone());
            socket.channel = SocketChannel::Stream(ClientStreamEnd(channel), server.clone());
            SocketPump::new(pcb, socket_kind, PumpChannel::Stream(server))
        } else {
            let channel = DatagramChannel::new(
                self.arena.clone(),
                DATAGRAM_PAYLOAD_CAPACITY,
                DATAGRAM_MAX_RECORD_SIZE,
                DATAGRAM_MAX_RECORDS,
                endpoint.client_notifier,
                endpoint.server_notifier,
            )
            .map_err(Error::from)?;
            let server = ServerDatagramEnd(channel.clone());
            socket.channel = SocketChannel::Datagram(ClientDatagramEnd(channel), server.clone());
            SocketPump::new(pcb, socket_kind, PumpChannel::Datagram(server))
        };

        self.sockets.insert(id, socket);
        self.pumps.insert(id, pump);
        Ok(ReplyMessage::with_fds(Reply::Socket(id), endpoint.client_fd, endpoint.server_fd))
    }

    fn do_bind(&mut self, id: SocketId, address: Option<WireAddress>) -> Result<Reply> {
        let socket = self.socket(id)?;
        let kind = socket.kind;
        let pcb = socket.pcb;

        if kind == SocketKind::Packet {
            let WireAddress::Link { interface, ethertype } = address.ok_or(Error::Invalid)? else {
                return Err(Error::Invalid);
            };
            let ethertype_filter = (ethertype != 0).then_some(ethertype);
            self.socket_mut(id)?.bind_packet(interface, ethertype_filter)?;
            return Ok(Reply::Ok);
        }

        let local = match address {
            Some(address) if !is_wildcard(&address) => wire_to_socket_addr(address)?,
            _ => {
                let port = self.ports.alloc(None).ok_or(Error::Again)?;
                wildcard_addr(port, matches!(address, Some(WireAddress::V6(_))))
            }
        };

        self.stack
            .submit(move |stack| stack.pcb_bind(pcb, local))
            .map_err(Error::from)?
            .map_err(Error::from)?;

        self.socket_mut(id)?.bind(local)?;
        Ok(Reply::Ok)
    }

    fn do_listen(&mut self, id: SocketId, backlog: i32) -> Result<Reply> {
        let pcb = self.socket(id)?.pcb;
        self.stack
            .submit(move |stack| stack.pcb_listen(pcb, backlog.max(0) as usize))
            .map_err(Error::from)?
            .map_err(Error::from)?;
        self.socket_mut(id)?.listen()?;
        Ok(Reply::Ok)
    }

    fn do_accept(&mut self, id: SocketId) -> Result<ReplyMessage> {
        self.socket(id)?.accept_precondition()?;
        let pcb = self.socket(id)?.pcb;

        let accepted_pcb = self
            .stack
            .submit(move |stack| stack.pcb_accept(pcb))
            .map_err(Error::from)?
            .map_err(Error::from)?
            .ok_or(Error::Again)?;

        let new_id = self.new_id();
        let mut accepted = Socket::new(new_id, SocketKind::Tcp, accepted_pcb);
        accepted.state = crate::socket::State::Connected;

        let endpoint = channel_endpoint().map_err(|_| Error::Internal)?;
        let channel = StreamChannel::new(
            self.arena.clone(),
            STREAM_RING_CAPACITY,
            endpoint.client_notifier,
            endpoint.server_notifier,
        )
        .map_err(Error::from)?;
        let server = ServerStreamEnd(channel.clone());
        accepted.channel = SocketChannel::Stream(ClientStreamEnd(channel), server.clone());

        self.sockets.insert(new_id, accepted);
        self.pumps
            .insert(new_id, SocketPump::new(accepted_pcb, SocketKind::Tcp, PumpChannel::Stream(server)));
        Ok(ReplyMessage::with_fds(Reply::Socket(new_id), endpoint.client_fd, endpoint.server_fd))
    }

    fn do_connect(&mut self, id: SocketId, address: WireAddress) -> Result<Reply> {
        let socket = self.socket(id)?;
        let kind = socket.kind;
        let pcb = socket.pcb;
        let wildcard = is_wildcard(&address);

        if kind != SocketKind::Packet {
            let remote = wire_to_socket_addr(address)?;
            self.stack
                .submit(move |stack| stack.pcb_connect(pcb, remote))
                .map_err(Error::from)?
                .map_err(Error::from)?;
            self.socket_mut(id)?.connect(remote, wildcard)?;
        }

        Ok(Reply::Ok)
    }

    fn do_shutdown(&mut self, id: SocketId) -> Result<Reply> {
        self.socket_mut(id)?.shutdown()?;
        Ok(Reply::Ok)
    }

    fn do_getsockname(&mut self, id: SocketId) -> Result<Reply> {
        let socket = self.socket(id)?;
        Ok(Reply::Address(socket.local.map(socket_addr_to_wire)))
    }

    fn do_getpeername(&mut self, id: SocketId) -> Result<Reply> {
        let socket = self.socket(id)?;
        if !socket.is_connected() {
            return Err(Error::NotConn);
        }
        Ok(Reply::Address(socket.remote.map(socket_addr_to_wire)))
    }

    fn do_getsockopt(&mut self, id: SocketId, level: OptLevel, name: OptName) -> Result<Reply> {
        let socket = self.socket(id)?;
        options::get(socket, level, name).map(Reply::OptValue)
    }

    fn do_setsockopt(&mut self, id: SocketId, level: OptLevel, name: OptName, value: crate::wire::OptValue) -> Result<Reply> {
        let socket = self.socket_mut(id)?;
        options::set(socket, level, name, value)?;
        let icmp_filter = socket.options.icmp_filter;

        if matches!(
            (level, name),
            (OptLevel::IpprotoRaw | OptLevel::IpprotoIp, OptName::IcmpFilter)
        ) {
            if let Some(pump) = self.pumps.get_mut(&id) {
                pump.set_icmp_filter(icmp_filter);
            }
        }

        Ok(Reply::Ok)
    }

    fn do_ioctl(&mut self, _id: SocketId, _request: u64, _arg: u64) -> Result<Reply> {
        Err(Error::NoProtoOpt)
    }

    fn do_close(&mut self, id: SocketId) -> Result<Reply> {
        let socket = self.sockets.remove(&id).ok_or(Error::NotFound)?;
        if let Some(pump) = self.pumps.remove(&id) {
            // Spec §4.6: "any unflushed TX data is flushed to the stack
            // before the channel is torn down" — drain the client's
            // half of the channel onto the PCB before it disappears.
            while pump.pump_send(&self.stack) > 0 {}
        }
        let pcb = socket.pcb;

        if let Some(SocketAddr::V4(addr4)) = socket.local {
            self.ports.restore(addr4.port());
        }

        let _ = self.stack.submit(move |stack| stack.pcb_close(pcb));
        Ok(Reply::Ok)
    }
}

/// Resolves a bound address's scope id for ARP/ND lookups (spec §4.6,
/// PACKET sockets): `Link` addresses carry no IP, so this always
/// returns `None` for them.
pub fn scope_address(address: &WireAddress) -> Option<IpAddr> {
    address.ip()
}
