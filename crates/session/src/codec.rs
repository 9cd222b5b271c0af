//! Wire encoding for [`Request`]/[`ReplyMessage`] (spec §4.6, §6): a
//! tagged-union byte layout, one discriminant byte per variant
//! followed by its fixed-width fields, in the same manual
//! `bytes::{Buf, BufMut, BytesMut}` style `wire::ethernet` uses for
//! frame headers. Ancillary file descriptors never appear in this
//! encoding — `server.rs` carries them separately as `SCM_RIGHTS`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error as SessionError;
use crate::wire::{
    Domain, Linger, Membership, OptLevel, OptName, OptValue, Reply, Request, ShutdownHow, SockKind, TcpInfo,
    WireAddress,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Truncated,
    Malformed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "buffer too short for wire message"),
            Self::Malformed => write!(f, "unknown discriminant or invalid field"),
        }
    }
}

impl std::error::Error for Error {}

type Result<T> = std::result::Result<T, Error>;

fn need(buf: &impl Buf, bytes: usize) -> Result<()> {
    if buf.remaining() < bytes { Err(Error::Truncated) } else { Ok(()) }
}

fn put_address(buf: &mut BytesMut, address: &WireAddress) {
    match address {
        WireAddress::V4(addr) => {
            buf.put_u8(0);
            buf.put_u32(u32::from(*addr.ip()));
            buf.put_u16(addr.port());
        }
        WireAddress::V6(addr) => {
            buf.put_u8(1);
            buf.put_u128(u128::from(*addr.ip()));
            buf.put_u16(addr.port());
            buf.put_u32(addr.flowinfo());
            buf.put_u32(addr.scope_id());
        }
        WireAddress::Link { interface, ethertype } => {
            buf.put_u8(2);
            buf.put_u32(*interface);
            buf.put_u16(*ethertype);
        }
    }
}

fn get_address(buf: &mut impl Buf) -> Result<WireAddress> {
    need(buf, 1)?;
    match buf.get_u8() {
        0 => {
            need(buf, 6)?;
            let ip = Ipv4Addr::from(buf.get_u32());
            let port = buf.get_u16();
            Ok(WireAddress::V4(SocketAddrV4::new(ip, port)))
        }
        1 => {
            need(buf, 26)?;
            let ip = Ipv6Addr::from(buf.get_u128());
            let port = buf.get_u16();
            let flowinfo = buf.get_u32();
            let scope_id = buf.get_u32();
            Ok(WireAddress::V6(SocketAddrV6::new(ip, port, flowinfo, scope_id)))
        }
        2 => {
            need(buf, 6)?;
            let interface = buf.get_u32();
            let ethertype = buf.get_u16();
            Ok(WireAddress::Link { interface, ethertype })
        }
        _ => Err(Error::Malformed),
    }
}

fn put_socket_id(buf: &mut BytesMut, id: (i32, u64)) {
    buf.put_i32(id.0);
    buf.put_u64(id.1);
}

fn get_socket_id(buf: &mut impl Buf) -> Result<(i32, u64)> {
    need(buf, 12)?;
    Ok((buf.get_i32(), buf.get_u64()))
}

fn domain_tag(domain: Domain) -> u8 {
    match domain {
        Domain::Inet => 0,
        Domain::Inet6 => 1,
        Domain::Packet => 2,
    }
}

fn domain_from_tag(tag: u8) -> Result<Domain> {
    match tag {
        0 => Ok(Domain::Inet),
        1 => Ok(Domain::Inet6),
        2 => Ok(Domain::Packet),
        _ => Err(Error::Malformed),
    }
}

fn kind_tag(kind: SockKind) -> u8 {
    match kind {
        SockKind::Stream => 0,
        SockKind::Dgram => 1,
        SockKind::Raw => 2,
        SockKind::Packet => 3,
    }
}

fn kind_from_tag(tag: u8) -> Result<SockKind> {
    match tag {
        0 => Ok(SockKind::Stream),
        1 => Ok(SockKind::Dgram),
        2 => Ok(SockKind::Raw),
        3 => Ok(SockKind::Packet),
        _ => Err(Error::Malformed),
    }
}

fn shutdown_tag(how: ShutdownHow) -> u8 {
    match how {
        ShutdownHow::Read => 0,
        ShutdownHow::Write => 1,
        ShutdownHow::Both => 2,
    }
}

fn shutdown_from_tag(tag: u8) -> Result<ShutdownHow> {
    match tag {
        0 => Ok(ShutdownHow::Read),
        1 => Ok(ShutdownHow::Write),
        2 => Ok(ShutdownHow::Both),
        _ => Err(Error::Malformed),
    }
}

fn level_tag(level: OptLevel) -> u8 {
    match level {
        OptLevel::SolSocket => 0,
        OptLevel::IpprotoIp => 1,
        OptLevel::IpprotoIpv6 => 2,
        OptLevel::IpprotoTcp => 3,
        OptLevel::IpprotoRaw => 4,
        OptLevel::SolPacket => 5,
    }
}

fn level_from_tag(tag: u8) -> Result<OptLevel> {
    match tag {
        0 => Ok(OptLevel::SolSocket),
        1 => Ok(OptLevel::IpprotoIp),
        2 => Ok(OptLevel::IpprotoIpv6),
        3 => Ok(OptLevel::IpprotoTcp),
        4 => Ok(OptLevel::IpprotoRaw),
        5 => Ok(OptLevel::SolPacket),
        _ => Err(Error::Malformed),
    }
}

fn name_tag(name: OptName) -> u8 {
    match name {
        OptName::SoType => 0,
        OptName::SoLinger => 1,
        OptName::SoRcvBuf => 2,
        OptName::SoSndBuf => 3,
        OptName::SoError => 4,
        OptName::SoReuseAddr => 5,
        OptName::IpTtl => 6,
        OptName::IpTos => 7,
        OptName::IpMulticastTtl => 8,
        OptName::IpMulticastLoop => 9,
        OptName::IpAddMembership => 10,
        OptName::IpDropMembership => 11,
        OptName::Ipv6UnicastHops => 12,
        OptName::Ipv6MulticastHops => 13,
        OptName::Ipv6MulticastLoop => 14,
        OptName::Ipv6V6Only => 15,
        OptName::Ipv6Checksum => 16,
        OptName::TcpNodelay => 17,
        OptName::TcpKeepIdle => 18,
        OptName::TcpKeepIntvl => 19,
        OptName::TcpKeepCnt => 20,
        OptName::TcpInfo => 21,
        OptName::RawIpv6Checksum => 22,
        OptName::PacketStatistics => 23,
        OptName::PacketAddMembership => 24,
        OptName::PacketDropMembership => 25,
        OptName::IcmpFilter => 26,
    }
}

fn name_from_tag(tag: u8) -> Result<OptName> {
    Ok(match tag {
        0 => OptName::SoType,
        1 => OptName::SoLinger,
        2 => OptName::SoRcvBuf,
        3 => OptName::SoSndBuf,
        4 => OptName::SoError,
        5 => OptName::SoReuseAddr,
        6 => OptName::IpTtl,
        7 => OptName::IpTos,
        8 => OptName::IpMulticastTtl,
        9 => OptName::IpMulticastLoop,
        10 => OptName::IpAddMembership,
        11 => OptName::IpDropMembership,
        12 => OptName::Ipv6UnicastHops,
        13 => OptName::Ipv6MulticastHops,
        14 => OptName::Ipv6MulticastLoop,
        15 => OptName::Ipv6V6Only,
        16 => OptName::Ipv6Checksum,
        17 => OptName::TcpNodelay,
        18 => OptName::TcpKeepIdle,
        19 => OptName::TcpKeepIntvl,
        20 => OptName::TcpKeepCnt,
        21 => OptName::TcpInfo,
        22 => OptName::RawIpv6Checksum,
        23 => OptName::PacketStatistics,
        24 => OptName::PacketAddMembership,
        25 => OptName::PacketDropMembership,
        26 => OptName::IcmpFilter,
        _ => return Err(Error::Malformed),
    })
}

fn put_opt_value(buf: &mut BytesMut, value: &OptValue) {
    match value {
        OptValue::Int(v) => {
            buf.put_u8(0);
            buf.put_i32(*v);
        }
        OptValue::Bool(v) => {
            buf.put_u8(1);
            buf.put_u8(*v as u8);
        }
        OptValue::Linger(Linger { onoff, seconds }) => {
            buf.put_u8(2);
            buf.put_u8(*onoff as u8);
            buf.put_i32(*seconds);
        }
        OptValue::Membership(Membership { multiaddr, interface }) => {
            buf.put_u8(3);
            put_ip(buf, *multiaddr);
            put_ip(buf, *interface);
        }
        OptValue::IcmpFilter(words) => {
            buf.put_u8(4);
            for word in words {
                buf.put_u64(*word);
            }
        }
        OptValue::TcpInfo(TcpInfo { state, rtt_micros }) => {
            buf.put_u8(5);
            buf.put_u8(*state);
            buf.put_u32(*rtt_micros);
        }
    }
}

fn put_ip(buf: &mut BytesMut, ip: std::net::IpAddr) {
    match ip {
        std::net::IpAddr::V4(addr) => {
            buf.put_u8(0);
            buf.put_u32(u32::from(addr));
        }
        std::net::IpAddr::V6(addr) => {
            buf.put_u8(1);
            buf.put_u128(u128::from(addr));
        }
    }
}

fn get_ip(buf: &mut impl Buf) -> Result<std::net::IpAddr> {
    need(buf, 1)?;
    match buf.get_u8() {
        0 => {
            need(buf, 4)?;
            Ok(std::net::IpAddr::V4(Ipv4Addr::from(buf.get_u32())))
        }
        1 => {
            need(buf, 16)?;
            Ok(std::net::IpAddr::V6(Ipv6Addr::from(buf.get_u128())))
        }
        _ => Err(Error::Malformed),
    }
}

fn get_opt_value(buf: &mut impl Buf) -> Result<OptValue> {
    need(buf, 1)?;
    match buf.get_u8() {
        0 => {
            need(buf, 4)?;
            Ok(OptValue::Int(buf.get_i32()))
        }
        1 => {
            need(buf, 1)?;
            Ok(OptValue::Bool(buf.get_u8() != 0))
        }
        2 => {
            need(buf, 5)?;
            let onoff = buf.get_u8() != 0;
            let seconds = buf.get_i32();
            Ok(OptValue::Linger(Linger { onoff, seconds }))
        }
        3 => {
            let multiaddr = get_ip(buf)?;
            let interface = get_ip(buf)?;
            Ok(OptValue::Membership(Membership { multiaddr, interface }))
        }
        4 => {
            need(buf, 32)?;
            let mut words = [0u64; 4];
            for word in &mut words {
                *word = buf.get_u64();
            }
            Ok(OptValue::IcmpFilter(words))
        }
        5 => {
            need(buf, 5)?;
            let state = buf.get_u8();
            let rtt_micros = buf.get_u32();
            Ok(OptValue::TcpInfo(TcpInfo { state, rtt_micros }))
        }
        _ => Err(Error::Malformed),
    }
}

pub fn encode_request(request: &Request, buf: &mut BytesMut) {
    match request {
        Request::Init { base_address } => {
            buf.put_u8(0);
            buf.put_u64(*base_address);
        }
        Request::Socket { domain, kind, protocol } => {
            buf.put_u8(1);
            buf.put_u8(domain_tag(*domain));
            buf.put_u8(kind_tag(*kind));
            buf.put_i32(*protocol);
        }
        Request::Bind { socket, address } => {
            buf.put_u8(2);
            put_socket_id(buf, *socket);
            buf.put_u8(address.is_some() as u8);
            if let Some(address) = address {
                put_address(buf, address);
            }
        }
        Request::Listen { socket, backlog } => {
            buf.put_u8(3);
            put_socket_id(buf, *socket);
            buf.put_i32(*backlog);
        }
        Request::Accept { socket } => {
            buf.put_u8(4);
            put_socket_id(buf, *socket);
        }
        Request::Connect { socket, address } => {
            buf.put_u8(5);
            put_socket_id(buf, *socket);
            put_address(buf, address);
        }
        Request::Shutdown { socket, how } => {
            buf.put_u8(6);
            put_socket_id(buf, *socket);
            buf.put_u8(shutdown_tag(*how));
        }
        Request::GetSockName { socket } => {
            buf.put_u8(7);
            put_socket_id(buf, *socket);
        }
        Request::GetPeerName { socket } => {
            buf.put_u8(8);
            put_socket_id(buf, *socket);
        }
        Request::GetSockOpt { socket, level, name } => {
            buf.put_u8(9);
            put_socket_id(buf, *socket);
            buf.put_u8(level_tag(*level));
            buf.put_u8(name_tag(*name));
        }
        Request::SetSockOpt { socket, level, name, value } => {
            buf.put_u8(10);
            put_socket_id(buf, *socket);
            buf.put_u8(level_tag(*level));
            buf.put_u8(name_tag(*name));
            put_opt_value(buf, value);
        }
        Request::Ioctl { socket, request, arg } => {
            buf.put_u8(11);
            put_socket_id(buf, *socket);
            buf.put_u64(*request);
            buf.put_u64(*arg);
        }
        Request::Close { socket } => {
            buf.put_u8(12);
            put_socket_id(buf, *socket);
        }
    }
}

pub fn decode_request(buf: &mut impl Buf) -> Result<Request> {
    need(buf, 1)?;
    Ok(match buf.get_u8() {
        0 => {
            need(buf, 8)?;
            Request::Init { base_address: buf.get_u64() }
        }
        1 => {
            need(buf, 6)?;
            let domain = domain_from_tag(buf.get_u8())?;
            let kind = kind_from_tag(buf.get_u8())?;
            let protocol = buf.get_i32();
            Request::Socket { domain, kind, protocol }
        }
        2 => {
            let socket = get_socket_id(buf)?;
            need(buf, 1)?;
            let address = if buf.get_u8() != 0 { Some(get_address(buf)?) } else { None };
            Request::Bind { socket, address }
        }
        3 => {
            let socket = get_socket_id(buf)?;
            need(buf, 4)?;
            Request::Listen { socket, backlog: buf.get_i32() }
        }
        4 => Request::Accept { socket: get_socket_id(buf)? },
        5 => {
            let socket = get_socket_id(buf)?;
            let address = get_address(buf)?;
            Request::Connect { socket, address }
        }
        6 => {
            let socket = get_socket_id(buf)?;
            need(buf, 1)?;
            Request::Shutdown { socket, how: shutdown_from_tag(buf.get_u8())? }
        }
        7 => Request::GetSockName { socket: get_socket_id(buf)? },
        8 => Request::GetPeerName { socket: get_socket_id(buf)? },
        9 => {
            let socket = get_socket_id(buf)?;
            need(buf, 2)?;
            let level = level_from_tag(buf.get_u8())?;
            let name = name_from_tag(buf.get_u8())?;
            Request::GetSockOpt { socket, level, name }
        }
        10 => {
            let socket = get_socket_id(buf)?;
            need(buf, 2)?;
            let level = level_from_tag(buf.get_u8())?;
            let name = name_from_tag(buf.get_u8())?;
            let value = get_opt_value(buf)?;
            Request::SetSockOpt { socket, level, name, value }
        }
        11 => {
            let socket = get_socket_id(buf)?;
            need(buf, 16)?;
            let request = buf.get_u64();
            let arg = buf.get_u64();
            Request::Ioctl { socket, request, arg }
        }
        12 => Request::Close { socket: get_socket_id(buf)? },
        _ => return Err(Error::Malformed),
    })
}

fn session_error_tag(error: SessionError) -> u8 {
    match error {
        SessionError::Invalid => 0,
        SessionError::NotFound => 1,
        SessionError::NotSocket => 2,
        SessionError::NotConn => 3,
        SessionError::AlreadyExists => 4,
        SessionError::OutOfMemory => 5,
        SessionError::OutOfRange => 6,
        SessionError::Corrupted => 7,
        SessionError::DoubleFree => 8,
        SessionError::Again => 9,
        SessionError::NoProtoOpt => 10,
        SessionError::Timeout => 11,
        SessionError::IndexOverflow => 12,
        SessionError::Internal => 13,
    }
}

fn session_error_from_tag(tag: u8) -> Result<SessionError> {
    Ok(match tag {
        0 => SessionError::Invalid,
        1 => SessionError::NotFound,
        2 => SessionError::NotSocket,
        3 => SessionError::NotConn,
        4 => SessionError::AlreadyExists,
        5 => SessionError::OutOfMemory,
        6 => SessionError::OutOfRange,
        7 => SessionError::Corrupted,
        8 => SessionError::DoubleFree,
        9 => SessionError::Again,
        10 => SessionError::NoProtoOpt,
        11 => SessionError::Timeout,
        12 => SessionError::IndexOverflow,
        13 => SessionError::Internal,
        _ => return Err(Error::Malformed),
    })
}

pub fn encode_reply(reply: &Reply, buf: &mut BytesMut) {
    match reply {
        Reply::Ok => buf.put_u8(0),
        Reply::Error(error) => {
            buf.put_u8(1);
            buf.put_u8(session_error_tag(*error));
        }
        Reply::Socket(id) => {
            buf.put_u8(2);
            put_socket_id(buf, *id);
        }
        Reply::Address(address) => {
            buf.put_u8(3);
            buf.put_u8(address.is_some() as u8);
            if let Some(address) = address {
                put_address(buf, address);
            }
        }
        Reply::OptValue(value) => {
            buf.put_u8(4);
            put_opt_value(buf, value);
        }
        Reply::IoctlResult(value) => {
            buf.put_u8(5);
            buf.put_u64(*value);
        }
    }
}

pub fn decode_reply(buf: &mut impl Buf) -> Result<Reply> {
    need(buf, 1)?;
    Ok(match buf.get_u8() {
        0 => Reply::Ok,
        1 => {
            need(buf, 1)?;
            Reply::Error(session_error_from_tag(buf.get_u8())?)
        }
        2 => Reply::Socket(get_socket_id(buf)?),
        3 => {
            need(buf, 1)?;
            let address = if buf.get_u8() != 0 { Some(get_address(buf)?) } else { None };
            Reply::Address(address)
        }
        4 => Reply::OptValue(get_opt_value(buf)?),
        5 => {
            need(buf, 8)?;
            Reply::IoctlResult(buf.get_u64())
        }
        _ => return Err(Error::Malformed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn bind_with_an_explicit_address_round_trips() {
        let request = Request::Bind {
            socket: (42, 7),
            address: Some(WireAddress::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9000))),
        };
        let mut buf = BytesMut::new();
        encode_request(&request, &mut buf);
        let decoded = decode_request(&mut buf).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn bind_with_no_address_round_trips() {
        let request = Request::Bind { socket: (1, 1), address: None };
        let mut buf = BytesMut::new();
        encode_request(&request, &mut buf);
        assert_eq!(decode_request(&mut buf).unwrap(), request);
    }

    #[test]
    fn error_reply_round_trips() {
        let reply = Reply::Error(SessionError::Again);
        let mut buf = BytesMut::new();
        encode_reply(&reply, &mut buf);
        assert_eq!(decode_reply(&mut buf).unwrap(), reply);
    }

    #[test]
    fn icmp_filter_opt_value_round_trips() {
        let reply = Reply::OptValue(OptValue::IcmpFilter([1, 2, 3, 4]));
        let mut buf = BytesMut::new();
        encode_reply(&reply, &mut buf);
        assert_eq!(decode_reply(&mut buf).unwrap(), reply);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(4); // Accept's discriminant, missing its socket id
        assert_eq!(decode_request(&mut buf), Err(Error::Truncated));
    }
}
