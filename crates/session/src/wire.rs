//! The control-socket wire protocol (spec §4.6, §6): a fixed-shape
//! request union and a fixed-shape reply union, exchanged as datagrams
//! over the Unix control socket, with an optional pair of file
//! descriptors riding in the reply's ancillary data for channel
//! bootstrap.

use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::Error;

/// `(pid, serial)`: `serial` is monotonic per client process (spec §3,
/// "Socket").
pub type SocketId = (i32, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Inet,
    Inet6,
    Packet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockKind {
    Stream,
    Dgram,
    Raw,
    Packet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireAddress {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Link { interface: u32, ethertype: u16 },
}

impl WireAddress {
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::V4(addr) => Some(SocketAddr::V4(*addr)),
            Self::V6(addr) => Some(SocketAddr::V6(*addr)),
            Self::Link { .. } => None,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.as_socket_addr().map(|addr| addr.ip())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownHow {
    Read,
    Write,
    Both,
}

/// `setsockopt`/`getsockopt` option levels, spec §4.6's exhaustive
/// catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    SolSocket,
    IpprotoIp,
    IpprotoIpv6,
    IpprotoTcp,
    IpprotoRaw,
    SolPacket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptName {
    // SOL_SOCKET
    SoType,
    SoLinger,
    SoRcvBuf,
    SoSndBuf,
    SoError,
    SoReuseAddr,
    // IPPROTO_IP
    IpTtl,
    IpTos,
    IpMulticastTtl,
    IpMulticastLoop,
    IpAddMembership,
    IpDropMembership,
    // IPPROTO_IPV6
    Ipv6UnicastHops,
    Ipv6MulticastHops,
    Ipv6MulticastLoop,
    Ipv6V6Only,
    Ipv6Checksum,
    // IPPROTO_TCP
    TcpNodelay,
    TcpKeepIdle,
    TcpKeepIntvl,
    TcpKeepCnt,
    TcpInfo,
    // IPPROTO_RAW
    RawIpv6Checksum,
    // SOL_PACKET
    PacketStatistics,
    PacketAddMembership,
    PacketDropMembership,
    // ICMP type filter, carried at SOL_RAW per spec §4.6 (ICMP).
    IcmpFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub multiaddr: IpAddr,
    pub interface: IpAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linger {
    pub onoff: bool,
    pub seconds: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpInfo {
    pub state: u8,
    pub rtt_micros: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptValue {
    Int(i32),
    Bool(bool),
    Linger(Linger),
    Membership(Membership),
    IcmpFilter([u64; 4]),
    TcpInfo(TcpInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Init { base_address: u64 },
    Socket { domain: Domain, kind: SockKind, protocol: i32 },
    Bind { socket: SocketId, address: Option<WireAddress> },
    Listen { socket: SocketId, backlog: i32 },
    Accept { socket: SocketId },
    Connect { socket: SocketId, address: WireAddress },
    Shutdown { socket: SocketId, how: ShutdownHow },
    GetSockName { socket: SocketId },
    GetPeerName { socket: SocketId },
    GetSockOpt { socket: SocketId, level: OptLevel, name: OptName },
    SetSockOpt { socket: SocketId, level: OptLevel, name: OptName, value: OptValue },
    Ioctl { socket: SocketId, request: u64, arg: u64 },
    Close { socket: SocketId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error(Error),
    Socket(SocketId),
    Address(Option<WireAddress>),
    OptValue(OptValue),
    IoctlResult(u64),
}

/// A reply plus the (client_fd, server_fd) pair passed in ancillary
/// data when the request bootstraps a new channel (`socket`,
/// `accept`). Most replies carry no descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyMessage {
    pub body: Reply,
    pub fds: Option<(i32, i32)>,
}

impl ReplyMessage {
    pub fn ok() -> Self {
        Self { body: Reply::Ok, fds: None }
    }

    pub fn error(error: Error) -> Self {
        Self { body: Reply::Error(error), fds: None }
    }

    pub fn with_fds(body: Reply, client_fd: i32, server_fd: i32) -> Self {
        Self { body, fds: Some((client_fd, server_fd)) }
    }
}

impl From<Result<Reply, Error>> for ReplyMessage {
    fn from(result: Result<Reply, Error>) -> Self {
        match result {
            Ok(body) => Self { body, fds: None },
            Err(error) => Self::error(error),
        }
    }
}
