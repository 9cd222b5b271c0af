//! The traffic generator's 20-byte signature trailer: a fixed pattern
//! used to identify generator-originated frames on the wire, a CRC-16
//! check value, and a 2-byte "cheater" field carrying a flow tag the
//! generator threads through without the receiver needing to decode
//! the rest of the payload.
//!
//! The CRC is CRC-16/GENIBUS: polynomial 0x1021, initial value 0xffff,
//! no input/output reflection, result complemented.

use bytes::{Buf, BufMut, BytesMut};

use crate::Error;

pub const SIGNATURE_LEN: usize = 20;
const DATA_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub data: [u8; DATA_LEN],
    pub cheater: u16,
}

impl Signature {
    /// # Test
    ///
    /// ```
    /// use openperf_wire::signature::Signature;
    ///
    /// let signature = Signature { data: [0xab; 16], cheater: 0x1234 };
    ///
    /// let mut buf = bytes::BytesMut::new();
    /// signature.encode(&mut buf);
    /// assert_eq!(buf.len(), 20);
    ///
    /// let mut cursor = &buf[..];
    /// let decoded = Signature::decode(&mut cursor).unwrap();
    /// assert_eq!(decoded, signature);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.data);
        buf.put_u16(crc16(&self.data));
        buf.put_u16(self.cheater);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < SIGNATURE_LEN {
            return Err(Error::BufferTooShort);
        }

        let mut data = [0u8; DATA_LEN];
        buf.copy_to_slice(&mut data);
        let crc = buf.get_u16();
        let cheater = buf.get_u16();

        if crc != crc16(&data) {
            return Err(Error::MalformedHeader);
        }

        Ok(Self { data, cheater })
    }

    /// Scans `frame` for a signature trailer with a valid CRC, returning
    /// its byte offset. Used by the generator-tag bypass to identify its
    /// own frames without relying on a fixed trailer offset.
    pub fn find(frame: &[u8]) -> Option<usize> {
        if frame.len() < SIGNATURE_LEN {
            return None;
        }
        let offset = frame.len() - SIGNATURE_LEN;
        let mut cursor = &frame[offset..];
        Signature::decode(&mut cursor).ok().map(|_| offset)
    }
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_a_corrupted_data_field() {
        let signature = Signature { data: [0x11; 16], cheater: 0 };
        let mut buf = BytesMut::new();
        signature.encode(&mut buf);
        buf[0] ^= 0xff;

        let mut cursor = &buf[..];
        assert_eq!(Signature::decode(&mut cursor), Err(Error::MalformedHeader));
    }

    #[test]
    fn find_locates_the_trailer_at_the_end_of_a_larger_frame() {
        let signature = Signature { data: [0x42; 16], cheater: 7 };
        let mut frame = vec![0u8; 50];
        let mut trailer = BytesMut::new();
        signature.encode(&mut trailer);
        frame.extend_from_slice(&trailer);

        assert_eq!(Signature::find(&frame), Some(50));
    }

    #[test]
    fn crc_of_all_zero_data_matches_the_known_genibus_value() {
        assert_eq!(crc16(&[0u8; 16]), 0x95f5);
    }
}
