//! IPv6 fixed header construction and parsing, RFC 8200. Extension
//! headers are out of scope; `next_header` names the upper-layer
//! protocol directly.

use std::net::Ipv6Addr;

use bytes::{Buf, BufMut, BytesMut};

use crate::Error;

pub const HEADER_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_length: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

impl Ipv6Header {
    /// # Test
    ///
    /// ```
    /// use openperf_wire::ipv6::Ipv6Header;
    ///
    /// let header = Ipv6Header {
    ///     traffic_class: 0,
    ///     flow_label: 0x12345,
    ///     payload_length: 64,
    ///     next_header: 6,
    ///     hop_limit: 64,
    ///     source: "fe80::1".parse().unwrap(),
    ///     destination: "fe80::2".parse().unwrap(),
    /// };
    ///
    /// let mut buf = bytes::BytesMut::new();
    /// header.encode(&mut buf);
    ///
    /// let mut cursor = &buf[..];
    /// let decoded = Ipv6Header::decode(&mut cursor).unwrap();
    /// assert_eq!(decoded, header);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        let word = (6u32 << 28) | ((self.traffic_class as u32) << 20) | (self.flow_label & 0x000f_ffff);
        buf.put_u32(word);
        buf.put_u16(self.payload_length);
        buf.put_u8(self.next_header);
        buf.put_u8(self.hop_limit);
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < HEADER_LEN {
            return Err(Error::BufferTooShort);
        }

        let word = buf.get_u32();
        if word >> 28 != 6 {
            return Err(Error::MalformedHeader);
        }

        let payload_length = buf.get_u16();
        let next_header = buf.get_u8();
        let hop_limit = buf.get_u8();

        let mut source_bytes = [0u8; 16];
        buf.copy_to_slice(&mut source_bytes);
        let mut destination_bytes = [0u8; 16];
        buf.copy_to_slice(&mut destination_bytes);

        Ok(Self {
            traffic_class: ((word >> 20) & 0xff) as u8,
            flow_label: word & 0x000f_ffff,
            payload_length,
            next_header,
            hop_limit,
            source: Ipv6Addr::from(source_bytes),
            destination: Ipv6Addr::from(destination_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_non_ipv6_version_nibble() {
        let buf = vec![0x00u8; HEADER_LEN];
        let mut cursor = &buf[..];
        assert_eq!(Ipv6Header::decode(&mut cursor), Err(Error::MalformedHeader));
    }

    #[test]
    fn flow_label_survives_the_round_trip() {
        let header = Ipv6Header {
            traffic_class: 0x2c,
            flow_label: 0xabcde,
            payload_length: 0,
            next_header: 17,
            hop_limit: 1,
            source: Ipv6Addr::UNSPECIFIED,
            destination: Ipv6Addr::LOCALHOST,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let mut cursor = &buf[..];
        assert_eq!(Ipv6Header::decode(&mut cursor).unwrap(), header);
    }
}
