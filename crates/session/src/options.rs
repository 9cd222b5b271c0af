//! `setsockopt`/`getsockopt` dispatch (spec §4.6): each `(level, name)`
//! pair either reads or writes a field on the socket's [`SocketOptions`]
//! or the underlying PCB's [`netstack::PcbOptions`]; anything outside
//! the catalogue comes back as `NoProtoOpt`.

use std::time::Duration;

use netstack::PcbOptions;

use crate::error::{Error, Result};
use crate::socket::{Socket, SocketKind};
use crate::wire::{Linger, Membership, OptLevel, OptName, OptValue, TcpInfo};

pub fn get(socket: &Socket, level: OptLevel, name: OptName) -> Result<OptValue> {
    match (level, name) {
        (OptLevel::SolSocket, OptName::SoType) => Ok(OptValue::Int(socket_type_constant(socket.kind))),
        (OptLevel::SolSocket, OptName::SoReuseAddr) => {
            Ok(OptValue::Bool(socket.socket_options.reuse_addr))
        }
        (OptLevel::SolSocket, OptName::SoRcvBuf) => Ok(OptValue::Int(socket.socket_options.rcv_buf)),
        (OptLevel::SolSocket, OptName::SoSndBuf) => Ok(OptValue::Int(socket.socket_options.snd_buf)),
        (OptLevel::SolSocket, OptName::SoError) => {
            Ok(OptValue::Int(socket.socket_options.last_error))
        }
        (OptLevel::SolSocket, OptName::SoLinger) => Ok(OptValue::Linger(Linger {
            onoff: socket.options.linger.is_some(),
            seconds: socket.options.linger.map(|d| d.as_secs() as i32).unwrap_or(0),
        })),

        (OptLevel::IpprotoIp, OptName::IpTtl) => Ok(OptValue::Int(socket.options.ttl as i32)),
        (OptLevel::IpprotoIp, OptName::IpTos) => Ok(OptValue::Int(socket.options.tos as i32)),
        (OptLevel::IpprotoIp, OptName::IpMulticastLoop) => {
            Ok(OptValue::Bool(socket.options.multicast_loop))
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6UnicastHops) => {
            Ok(OptValue::Int(socket.options.ttl as i32))
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6MulticastHops) => {
            Ok(OptValue::Int(socket.options.v6_multicast_hops as i32))
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6MulticastLoop) => {
            Ok(OptValue::Bool(socket.options.v6_multicast_loop))
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6V6Only) => Ok(OptValue::Bool(socket.options.v6_only)),
        (OptLevel::IpprotoIpv6, OptName::Ipv6Checksum) => Ok(OptValue::Int(
            socket.options.v6_checksum_offset.map(|v| v as i32).unwrap_or(-1),
        )),

        (OptLevel::IpprotoRaw, OptName::RawIpv6Checksum) => Ok(OptValue::Int(
            socket.options.checksum_offset.map(|v| v as i32).unwrap_or(-1),
        )),

        (OptLevel::IpprotoRaw, OptName::IcmpFilter) | (OptLevel::IpprotoIp, OptName::IcmpFilter) => {
            require(socket.kind == SocketKind::Icmp)?;
            Ok(OptValue::IcmpFilter(socket.options.icmp_filter))
        }

        (OptLevel::IpprotoTcp, OptName::TcpNodelay) => {
            require(socket.kind == SocketKind::Tcp)?;
            Ok(OptValue::Bool(false))
        }
        (OptLevel::IpprotoTcp, OptName::TcpInfo) => {
            require(socket.kind == SocketKind::Tcp)?;
            Ok(OptValue::TcpInfo(TcpInfo {
                state: tcp_state_constant(socket),
                rtt_micros: 0,
            }))
        }

        (OptLevel::SolPacket, OptName::PacketStatistics) => {
            require(socket.kind == SocketKind::Packet)?;
            let (rx, _) = socket.packet_stats;
            Ok(OptValue::Int(rx.min(i32::MAX as u64) as i32))
        }

        _ => Err(Error::NoProtoOpt),
    }
}

pub fn set(socket: &mut Socket, level: OptLevel, name: OptName, value: OptValue) -> Result<()> {
    match (level, name, value) {
        (OptLevel::SolSocket, OptName::SoReuseAddr, OptValue::Bool(flag)) => {
            socket.socket_options.reuse_addr = flag;
            Ok(())
        }
        (OptLevel::SolSocket, OptName::SoRcvBuf, OptValue::Int(size)) => {
            socket.socket_options.rcv_buf = size;
            Ok(())
        }
        (OptLevel::SolSocket, OptName::SoSndBuf, OptValue::Int(size)) => {
            socket.socket_options.snd_buf = size;
            Ok(())
        }
        (OptLevel::SolSocket, OptName::SoLinger, OptValue::Linger(linger)) => {
            socket.options.linger = linger.onoff.then(|| Duration::from_secs(linger.seconds.max(0) as u64));
            Ok(())
        }

        (OptLevel::IpprotoIp, OptName::IpTtl, OptValue::Int(ttl))
        | (OptLevel::IpprotoIpv6, OptName::Ipv6UnicastHops, OptValue::Int(ttl)) => {
            socket.options.ttl = ttl.clamp(1, 255) as u8;
            Ok(())
        }
        (OptLevel::IpprotoIp, OptName::IpTos, OptValue::Int(tos)) => {
            socket.options.tos = tos as u8;
            Ok(())
        }
        (OptLevel::IpprotoIp, OptName::IpMulticastLoop, OptValue::Bool(flag)) => {
            socket.options.multicast_loop = flag;
            Ok(())
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6MulticastHops, OptValue::Int(hops)) => {
            socket.options.v6_multicast_hops = hops.clamp(0, 255) as u8;
            Ok(())
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6MulticastLoop, OptValue::Bool(flag)) => {
            socket.options.v6_multicast_loop = flag;
            Ok(())
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6V6Only, OptValue::Bool(flag)) => {
            socket.options.v6_only = flag;
            Ok(())
        }
        (OptLevel::IpprotoIpv6, OptName::Ipv6Checksum, OptValue::Int(offset)) => {
            socket.options.v6_checksum_offset = (offset >= 0).then_some(offset as u16);
            Ok(())
        }

        (OptLevel::IpprotoIp, OptName::IpMulticastTtl, OptValue::Int(ttl)) => {
            socket.options.ttl = ttl.clamp(1, 255) as u8;
            Ok(())
        }
        (OptLevel::IpprotoIp, OptName::IpAddMembership, OptValue::Membership(membership))
        | (OptLevel::SolPacket, OptName::PacketAddMembership, OptValue::Membership(membership)) => {
            add_membership(&mut socket.options, membership);
            Ok(())
        }
        (OptLevel::IpprotoIp, OptName::IpDropMembership, OptValue::Membership(membership))
        | (OptLevel::SolPacket, OptName::PacketDropMembership, OptValue::Membership(membership)) => {
            drop_membership(&mut socket.options, membership);
            Ok(())
        }

        (OptLevel::IpprotoRaw, OptName::RawIpv6Checksum, OptValue::Int(offset)) => {
            socket.options.checksum_offset = (offset >= 0).then_some(offset as u16);
            Ok(())
        }

        (OptLevel::IpprotoRaw, OptName::IcmpFilter, OptValue::IcmpFilter(bitmap))
        | (OptLevel::IpprotoIp, OptName::IcmpFilter, OptValue::IcmpFilter(bitmap)) => {
            require(socket.kind == SocketKind::Icmp)?;
            socket.options.icmp_filter = bitmap;
            Ok(())
        }

        (OptLevel::IpprotoTcp, OptName::TcpNodelay, OptValue::Bool(_)) => {
            require(socket.kind == SocketKind::Tcp)?;
            Ok(())
        }
        (OptLevel::IpprotoTcp, OptName::TcpKeepIdle, OptValue::Int(_))
        | (OptLevel::IpprotoTcp, OptName::TcpKeepIntvl, OptValue::Int(_))
        | (OptLevel::IpprotoTcp, OptName::TcpKeepCnt, OptValue::Int(_)) => {
            require(socket.kind == SocketKind::Tcp)?;
            Ok(())
        }

        _ => Err(Error::NoProtoOpt),
    }
}

fn require(ok: bool) -> Result<()> {
    if ok { Ok(()) } else { Err(Error::NotSocket) }
}

fn add_membership(options: &mut PcbOptions, membership: Membership) {
    if !options.multicast_memberships.contains(&membership.multiaddr) {
        options.multicast_memberships.push(membership.multiaddr);
    }
}

fn drop_membership(options: &mut PcbOptions, membership: Membership) {
    options.multicast_memberships.retain(|addr| *addr != membership.multiaddr);
}

fn socket_type_constant(kind: SocketKind) -> i32 {
    match kind {
        SocketKind::Raw | SocketKind::Icmp => 3,
        SocketKind::Udp => 2,
        SocketKind::Tcp => 1,
        SocketKind::Packet => 3,
    }
}

fn tcp_state_constant(socket: &Socket) -> u8 {
    use crate::socket::State;
    match socket.state {
        State::Init | State::Bound => 0,
        State::Connecting => 2,
        State::Connected => 1,
        State::Listening => 10,
        State::Closing => 7,
        State::Closed => 7,
        State::Error(_) => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SocketId;

    fn raw_socket() -> Socket {
        Socket::new((1, 1) as SocketId, SocketKind::Raw, 0)
    }

    #[test]
    fn unknown_option_pair_is_no_proto_opt() {
        let socket = raw_socket();
        assert_eq!(get(&socket, OptLevel::IpprotoTcp, OptName::TcpNodelay), Err(Error::NoProtoOpt));
    }

    #[test]
    fn ttl_round_trips_through_set_and_get() {
        let mut socket = raw_socket();
        set(&mut socket, OptLevel::IpprotoIp, OptName::IpTtl, OptValue::Int(32)).unwrap();
        assert_eq!(get(&socket, OptLevel::IpprotoIp, OptName::IpTtl), Ok(OptValue::Int(32)));
    }

    #[test]
    fn icmp_filter_is_rejected_for_non_icmp_sockets() {
        let mut socket = raw_socket();
        let result = set(
            &mut socket,
            OptLevel::IpprotoRaw,
            OptName::IcmpFilter,
            OptValue::IcmpFilter([0; 4]),
        );
        assert_eq!(result, Err(Error::NotSocket));
    }

    #[test]
    fn icmp_filter_round_trips_for_icmp_sockets() {
        let mut socket = Socket::new((1, 1), SocketKind::Icmp, 0);
        set(&mut socket, OptLevel::IpprotoRaw, OptName::IcmpFilter, OptValue::IcmpFilter([1, 0, 0, 0]))
            .unwrap();
        assert_eq!(
            get(&socket, OptLevel::IpprotoRaw, OptName::IcmpFilter),
            Ok(OptValue::IcmpFilter([1, 0, 0, 0]))
        );
    }

    #[test]
    fn packet_statistics_requires_a_packet_socket() {
        let socket = raw_socket();
        assert_eq!(get(&socket, OptLevel::SolPacket, OptName::PacketStatistics), Err(Error::NotSocket));
    }

    #[test]
    fn ip_tos_and_multicast_loop_round_trip() {
        let mut socket = raw_socket();
        set(&mut socket, OptLevel::IpprotoIp, OptName::IpTos, OptValue::Int(0x10)).unwrap();
        assert_eq!(get(&socket, OptLevel::IpprotoIp, OptName::IpTos), Ok(OptValue::Int(0x10)));

        set(&mut socket, OptLevel::IpprotoIp, OptName::IpMulticastLoop, OptValue::Bool(false)).unwrap();
        assert_eq!(
            get(&socket, OptLevel::IpprotoIp, OptName::IpMulticastLoop),
            Ok(OptValue::Bool(false))
        );
    }

    #[test]
    fn ipv6_multicast_and_v6only_options_round_trip() {
        let mut socket = raw_socket();
        set(&mut socket, OptLevel::IpprotoIpv6, OptName::Ipv6MulticastHops, OptValue::Int(4)).unwrap();
        assert_eq!(get(&socket, OptLevel::IpprotoIpv6, OptName::Ipv6MulticastHops), Ok(OptValue::Int(4)));

        set(&mut socket, OptLevel::IpprotoIpv6, OptName::Ipv6MulticastLoop, OptValue::Bool(false)).unwrap();
        assert_eq!(
            get(&socket, OptLevel::IpprotoIpv6, OptName::Ipv6MulticastLoop),
            Ok(OptValue::Bool(false))
        );

        set(&mut socket, OptLevel::IpprotoIpv6, OptName::Ipv6V6Only, OptValue::Bool(true)).unwrap();
        assert_eq!(get(&socket, OptLevel::IpprotoIpv6, OptName::Ipv6V6Only), Ok(OptValue::Bool(true)));
    }

    #[test]
    fn ipv6_checksum_offset_is_distinct_from_the_raw_level_offset() {
        let mut socket = raw_socket();
        set(&mut socket, OptLevel::IpprotoRaw, OptName::RawIpv6Checksum, OptValue::Int(2)).unwrap();
        set(&mut socket, OptLevel::IpprotoIpv6, OptName::Ipv6Checksum, OptValue::Int(6)).unwrap();

        assert_eq!(get(&socket, OptLevel::IpprotoRaw, OptName::RawIpv6Checksum), Ok(OptValue::Int(2)));
        assert_eq!(get(&socket, OptLevel::IpprotoIpv6, OptName::Ipv6Checksum), Ok(OptValue::Int(6)));
    }
}
