//! TCP segment header construction and parsing, RFC 9293. Options are
//! treated as an opaque trailing byte slice; this crate does not parse
//! individual option kinds.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::Error;

pub const MIN_HEADER_LEN: usize = 20;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TcpFlags: u16 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
        const ECE = 0b0100_0000;
        const CWR = 0b1000_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub urgent_pointer: u16,
    pub options: Bytes,
}

impl TcpHeader {
    pub fn encoded_len(&self) -> usize {
        MIN_HEADER_LEN + pad_to_word(self.options.len())
    }

    /// # Test
    ///
    /// ```
    /// use openperf_wire::tcp::{TcpFlags, TcpHeader};
    ///
    /// let header = TcpHeader {
    ///     source_port: 1234,
    ///     destination_port: 80,
    ///     sequence_number: 1,
    ///     acknowledgment_number: 0,
    ///     flags: TcpFlags::SYN,
    ///     window_size: 65535,
    ///     urgent_pointer: 0,
    ///     options: bytes::Bytes::new(),
    /// };
    ///
    /// let mut buf = bytes::BytesMut::new();
    /// header.encode(&mut buf);
    ///
    /// let mut cursor = &buf[..];
    /// let decoded = TcpHeader::decode(&mut cursor).unwrap();
    /// assert_eq!(decoded, header);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        let padded_options_len = pad_to_word(self.options.len());
        let data_offset_words = (MIN_HEADER_LEN + padded_options_len) / 4;

        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u32(self.sequence_number);
        buf.put_u32(self.acknowledgment_number);
        buf.put_u16(((data_offset_words as u16) << 12) | self.flags.bits());
        buf.put_u16(self.window_size);
        buf.put_u16(0); // checksum, filled in by the pseudo-header-aware caller
        buf.put_u16(self.urgent_pointer);
        buf.put_slice(&self.options);
        buf.put_bytes(0, padded_options_len - self.options.len());
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < MIN_HEADER_LEN {
            return Err(Error::BufferTooShort);
        }

        let source_port = buf.get_u16();
        let destination_port = buf.get_u16();
        let sequence_number = buf.get_u32();
        let acknowledgment_number = buf.get_u32();
        let offset_flags = buf.get_u16();
        let window_size = buf.get_u16();
        let _checksum = buf.get_u16();
        let urgent_pointer = buf.get_u16();

        let data_offset_words = (offset_flags >> 12) as usize;
        let header_len = data_offset_words * 4;
        if header_len < MIN_HEADER_LEN {
            return Err(Error::MalformedHeader);
        }

        let options_len = header_len - MIN_HEADER_LEN;
        if buf.remaining() < options_len {
            return Err(Error::BufferTooShort);
        }
        let options = buf.copy_to_bytes(options_len);

        Ok(Self {
            source_port,
            destination_port,
            sequence_number,
            acknowledgment_number,
            flags: TcpFlags::from_bits_truncate(offset_flags & 0x01ff),
            window_size,
            urgent_pointer,
            options,
        })
    }
}

fn pad_to_word(len: usize) -> usize {
    len.div_ceil(4) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_data_offset_smaller_than_the_fixed_header() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u16(1 << 12); // data offset of 1 word, below the 5-word minimum
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u16(0);

        let mut cursor = &buf[..];
        assert_eq!(TcpHeader::decode(&mut cursor), Err(Error::MalformedHeader));
    }

    #[test]
    fn options_are_padded_to_a_four_byte_boundary() {
        let header = TcpHeader {
            source_port: 1,
            destination_port: 2,
            sequence_number: 0,
            acknowledgment_number: 0,
            flags: TcpFlags::ACK,
            window_size: 0,
            urgent_pointer: 0,
            options: Bytes::from_static(&[1, 2, 3]),
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), MIN_HEADER_LEN + 4);
    }
}
