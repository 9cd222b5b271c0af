//! Per-socket state machines (spec §4.6): RAW, UDP, TCP, PACKET, and
//! the ICMP specialization of RAW. All four share the same shape — a
//! state variant plus per-state transitions triggered only by request
//! messages and stack callbacks — so one [`Socket`] type carries a
//! [`SocketKind`] tag and dispatches its transitions accordingly
//! rather than four separate types repeating the same plumbing.

use std::net::SocketAddr;

use netstack::{PcbId, PcbOptions};

use crate::error::{Error, Result};
use crate::wire::SocketId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Raw,
    Icmp,
    Udp,
    Tcp,
    Packet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Bound,
    Connecting,
    Connected,
    Listening,
    Closing,
    Closed,
    Error(Error),
}

/// SOL_SOCKET-level state that isn't part of the PCB itself.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    pub reuse_addr: bool,
    pub rcv_buf: i32,
    pub snd_buf: i32,
    pub last_error: i32,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reuse_addr: false,
            rcv_buf: 212_992,
            snd_buf: 212_992,
            last_error: 0,
        }
    }
}

/// Channel storage belonging to this socket. RAW/UDP/PACKET/ICMP ride
/// a datagram channel; TCP rides a stream channel. `None` before the
/// server has finished bootstrapping the channel for a brand-new
/// socket.
pub enum SocketChannel {
    None,
    Stream(channel::ClientStreamEnd, channel::ServerStreamEnd),
    Datagram(channel::ClientDatagramEnd, channel::ServerDatagramEnd),
}

pub struct Socket {
    pub id: SocketId,
    pub kind: SocketKind,
    pub pcb: PcbId,
    pub state: State,
    pub channel: SocketChannel,
    pub options: PcbOptions,
    pub socket_options: SocketOptions,
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
    pub bound_interface: Option<u32>,
    pub ethertype_filter: Option<u16>,
    pub packet_stats: (u64, u64),
}

impl Socket {
    pub fn new(id: SocketId, kind: SocketKind, pcb: PcbId) -> Self {
        Self {
            id,
            kind,
            pcb,
            state: State::Init,
            channel: SocketChannel::None,
            options: PcbOptions::default(),
            socket_options: SocketOptions::default(),
            local: None,
            remote: None,
            bound_interface: None,
            ethertype_filter: None,
            packet_stats: (0, 0),
        }
    }

    fn require(&self, ok: bool) -> Result<()> {
        if ok { Ok(()) } else { Err(Error::Invalid) }
    }

    /// `bind` (spec §4.6): `init → bound` for every kind. PACKET's
    /// `bind` additionally captures an interface index and ethertype
    /// filter, passed in by the caller once the address decodes.
    pub fn bind(&mut self, local: SocketAddr) -> Result<()> {
        match self.state {
            State::Init => {
                self.local = Some(local);
                self.state = State::Bound;
                Ok(())
            }
            State::Bound => Err(Error::AlreadyExists),
            _ => Err(Error::Invalid),
        }
    }

    pub fn bind_packet(&mut self, interface: u32, ethertype_filter: Option<u16>) -> Result<()> {
        self.require(self.kind == SocketKind::Packet)?;
        match self.state {
            State::Init => {
                self.bound_interface = Some(interface);
                self.ethertype_filter = ethertype_filter;
                self.state = State::Bound;
                Ok(())
            }
            _ => Err(Error::AlreadyExists),
        }
    }

    /// `connect` (spec §4.6): RAW/UDP/ICMP move `{init,bound} →
    /// connected`, or `connected → bound` when the target is the
    /// wildcard address. TCP moves `{init,bound} → connecting`; the
    /// stack's "connected" callback later advances it to `connected`.
    /// PACKET has no connected state.
    pub fn connect(&mut self, remote: SocketAddr, wildcard: bool) -> Result<()> {
        match self.kind {
            SocketKind::Raw | SocketKind::Icmp | SocketKind::Udp => match (self.state, wildcard) {
                (State::Init | State::Bound, false) => {
                    self.remote = Some(remote);
                    self.state = State::Connected;
                    Ok(())
                }
                (State::Connected, true) => {
                    self.remote = None;
                    self.state = State::Bound;
                    Ok(())
                }
                _ => Err(Error::Invalid),
            },
            SocketKind::Tcp => match self.state {
                State::Init | State::Bound => {
                    self.remote = Some(remote);
                    self.state = State::Connecting;
                    Ok(())
                }
                _ => Err(Error::Invalid),
            },
            SocketKind::Packet => Err(Error::NotSocket),
        }
    }

    /// The stack thread's "connected" callback (TCP only): advances a
    /// socket that's waiting on a handshake.
    pub fn on_stack_connected(&mut self) {
        if self.kind == SocketKind::Tcp && self.state == State::Connecting {
            self.state = State::Connected;
        }
    }

    /// The stack thread's "closed" callback (TCP only): the peer (or
    /// a prior local `shutdown`) has finished tearing the connection
    /// down.
    pub fn on_stack_closed(&mut self) {
        if self.kind == SocketKind::Tcp {
            self.state = State::Closed;
        }
    }

    pub fn listen(&mut self) -> Result<()> {
        self.require(self.kind == SocketKind::Tcp)?;
        match self.state {
            State::Init | State::Bound => {
                self.state = State::Listening;
                Ok(())
            }
            _ => Err(Error::Invalid),
        }
    }

    pub fn accept_precondition(&self) -> Result<()> {
        self.require(self.kind == SocketKind::Tcp)?;
        self.require(self.state == State::Listening)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self.kind {
            SocketKind::Tcp => {
                self.require(self.state == State::Connected)?;
                self.state = State::Closing;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `close` (spec §4.6): any state moves to `closed`. Flushing TX
    /// and tearing down channel storage is the caller's job — this
    /// only finalizes the state-machine transition.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn raw_socket_follows_init_bound_connected_closed() {
        let mut socket = Socket::new((1, 1), SocketKind::Raw, 0);
        assert_eq!(socket.state, State::Init);

        socket.bind(addr(0)).unwrap();
        assert_eq!(socket.state, State::Bound);

        socket.connect(addr(9000), false).unwrap();
        assert_eq!(socket.state, State::Connected);

        socket.connect(addr(0), true).unwrap();
        assert_eq!(socket.state, State::Bound);

        socket.close();
        assert_eq!(socket.state, State::Closed);
    }

    #[test]
    fn double_bind_is_already_exists() {
        let mut socket = Socket::new((1, 1), SocketKind::Udp, 0);
        socket.bind(addr(0)).unwrap();
        assert_eq!(socket.bind(addr(1)), Err(Error::AlreadyExists));
    }

    #[test]
    fn tcp_connect_goes_through_connecting_until_the_stack_callback_fires() {
        let mut socket = Socket::new((1, 1), SocketKind::Tcp, 0);
        socket.bind(addr(0)).unwrap();
        socket.connect(addr(9000), false).unwrap();
        assert_eq!(socket.state, State::Connecting);

        socket.on_stack_connected();
        assert_eq!(socket.state, State::Connected);

        socket.shutdown().unwrap();
        assert_eq!(socket.state, State::Closing);

        socket.on_stack_closed();
        assert_eq!(socket.state, State::Closed);
    }

    #[test]
    fn packet_socket_has_no_connected_state() {
        let mut socket = Socket::new((1, 1), SocketKind::Packet, 0);
        socket.bind_packet(2, Some(0x0800)).unwrap();
        assert_eq!(socket.state, State::Bound);
        assert_eq!(socket.connect(addr(0), false), Err(Error::NotSocket));
    }

    #[test]
    fn icmp_filter_defaults_allow_all_and_can_be_narrowed() {
        let mut socket = Socket::new((1, 1), SocketKind::Icmp, 0);
        assert!(socket.options.allows_icmp_type(8));
        socket.options.set_icmp_type(8, false);
        assert!(!socket.options.allows_icmp_type(8));
    }
}
