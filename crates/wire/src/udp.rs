//! UDP datagram header construction and parsing, RFC 768.

use bytes::{Buf, BufMut, BytesMut};

use crate::Error;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
}

impl UdpHeader {
    /// # Test
    ///
    /// ```
    /// use openperf_wire::udp::UdpHeader;
    ///
    /// let header = UdpHeader { source_port: 53, destination_port: 5353, length: 16 };
    ///
    /// let mut buf = bytes::BytesMut::new();
    /// header.encode(&mut buf);
    ///
    /// let mut cursor = &buf[..];
    /// assert_eq!(UdpHeader::decode(&mut cursor).unwrap(), header);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u16(self.length);
        buf.put_u16(0); // checksum, filled in by the pseudo-header-aware caller
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < HEADER_LEN {
            return Err(Error::BufferTooShort);
        }

        let source_port = buf.get_u16();
        let destination_port = buf.get_u16();
        let length = buf.get_u16();
        let _checksum = buf.get_u16();

        Ok(Self { source_port, destination_port, length })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_a_short_buffer() {
        let buf = [0u8; 4];
        let mut cursor = &buf[..];
        assert_eq!(UdpHeader::decode(&mut cursor), Err(Error::BufferTooShort));
    }
}
