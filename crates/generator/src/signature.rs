//! Spirent-style signature payload: a 32-bit stream id, a 32-bit
//! sequence number, a 62-bit timestamp, and two flag bits, packed into
//! the 16-byte data field of [`wire::signature::Signature`].

use wire::signature::Signature;

const TIMESTAMP_MASK: u64 = (1 << 62) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSignature {
    pub stream_id: u32,
    pub sequence_number: u32,
    /// Nanoseconds since the generator's epoch, truncated to 62 bits.
    pub timestamp: u64,
    pub flags: u8,
}

impl GeneratorSignature {
    /// # Test
    ///
    /// ```
    /// use openperf_generator::signature::GeneratorSignature;
    ///
    /// let signature = GeneratorSignature {
    ///     stream_id: 7,
    ///     sequence_number: 42,
    ///     timestamp: 123_456_789,
    ///     flags: 0b10,
    /// };
    ///
    /// let trailer = signature.to_trailer();
    /// assert_eq!(GeneratorSignature::from_trailer(&trailer), signature);
    /// ```
    pub fn to_trailer(&self) -> Signature {
        let mut data = [0u8; 16];
        data[0..4].copy_from_slice(&self.stream_id.to_be_bytes());
        data[4..8].copy_from_slice(&self.sequence_number.to_be_bytes());

        let word = ((self.timestamp & TIMESTAMP_MASK) << 2) | (self.flags as u64 & 0b11);
        data[8..16].copy_from_slice(&word.to_be_bytes());

        Signature { data, cheater: 0 }
    }

    pub fn from_trailer(signature: &Signature) -> Self {
        let stream_id = u32::from_be_bytes(signature.data[0..4].try_into().unwrap());
        let sequence_number = u32::from_be_bytes(signature.data[4..8].try_into().unwrap());
        let word = u64::from_be_bytes(signature.data[8..16].try_into().unwrap());

        Self {
            stream_id,
            sequence_number,
            timestamp: (word >> 2) & TIMESTAMP_MASK,
            flags: (word & 0b11) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_beyond_62_bits_is_truncated() {
        let signature = GeneratorSignature {
            stream_id: 0,
            sequence_number: 0,
            timestamp: u64::MAX,
            flags: 0,
        };

        let round_tripped = GeneratorSignature::from_trailer(&signature.to_trailer());
        assert_eq!(round_tripped.timestamp, TIMESTAMP_MASK);
    }
}
