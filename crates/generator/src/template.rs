//! Field modifiers, tie composition, and packet template expansion.
//!
//! A [`Modifier`] yields a sequence of field values. When two or more
//! modifiers are attached to one protocol header, a [`Tie`] combines
//! them: `Zip` walks them in lockstep (the combined length is the LCM
//! of the member counts, each member wrapping around as needed),
//! `Cartesian` is the outer product (the combined length is the
//! product of the member counts). The same two tie kinds compose the
//! top-level template across its protocol headers.

use crate::error::Error;

/// One field's possible values, as raw bytes, widest byte order last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    List(Vec<Vec<u8>>),
    /// An arithmetic sequence over a `width`-byte big-endian integer
    /// field: `start, start + skip, start + 2*skip, ..., stop]`.
    Sequence {
        start: u64,
        stop: u64,
        skip: u64,
        width: usize,
    },
}

impl Modifier {
    pub fn len(&self) -> Result<usize, Error> {
        match self {
            Self::List(values) => {
                if values.is_empty() {
                    return Err(Error::EmptyModifier);
                }
                Ok(values.len())
            }
            Self::Sequence { start, stop, skip, .. } => {
                if *skip == 0 {
                    return if start == stop { Ok(1) } else { Err(Error::NonTerminatingSequence) };
                }
                if start > stop {
                    return Err(Error::NonTerminatingSequence);
                }
                let count = (stop - start) / skip + 1;
                Ok(count as usize)
            }
        }
    }

    pub fn value_at(&self, index: usize) -> Vec<u8> {
        match self {
            Self::List(values) => values[index % values.len()].clone(),
            Self::Sequence { start, skip, width, .. } => {
                let value = start + (index as u64) * skip;
                let bytes = value.to_be_bytes();
                bytes[8 - width..].to_vec()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tie {
    Zip,
    Cartesian,
}

impl Tie {
    /// Combines a set of member lengths into the tie's total length,
    /// per the spec's LCM-for-zip / product-for-cartesian rule.
    pub fn combine(&self, member_lengths: &[usize]) -> Result<u32, Error> {
        if member_lengths.is_empty() {
            return Ok(1);
        }

        let combined: u64 = match self {
            Self::Zip => member_lengths.iter().fold(1u64, |acc, &len| lcm(acc, len as u64)),
            Self::Cartesian => {
                let mut product: u64 = 1;
                for &len in member_lengths {
                    product = product.saturating_mul(len as u64);
                    if product > u32::MAX as u64 {
                        return Err(Error::IndexOverflow);
                    }
                }
                product
            }
        };

        u32::try_from(combined).map_err(|_| Error::IndexOverflow)
    }

    /// The per-member index to sample at the `tie_index`'th combined step.
    pub fn member_index(&self, tie_index: u32, member_lengths: &[usize], member: usize) -> usize {
        match self {
            Self::Zip => tie_index as usize % member_lengths[member],
            Self::Cartesian => {
                let mut stride = 1usize;
                for &len in &member_lengths[member + 1..] {
                    stride = stride.saturating_mul(len);
                }
                (tie_index as usize / stride) % member_lengths[member]
            }
        }
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}

/// One field position (a byte offset plus width) modified within a
/// protocol header's base bytes, and the modifier driving it.
#[derive(Debug, Clone)]
pub struct FieldModifier {
    pub offset: usize,
    pub width: usize,
    pub modifier: Modifier,
}

/// One protocol header in the template: its base bytes and the field
/// modifiers layered over them, combined by `tie` when there is more
/// than one.
#[derive(Debug, Clone)]
pub struct ProtocolTemplate {
    pub base: Vec<u8>,
    pub fields: Vec<FieldModifier>,
    pub tie: Tie,
}

impl ProtocolTemplate {
    fn member_lengths(&self) -> Result<Vec<usize>, Error> {
        self.fields.iter().map(|field| field.modifier.len()).collect()
    }

    pub fn expansion_len(&self) -> Result<u32, Error> {
        if self.fields.is_empty() {
            return Ok(1);
        }
        self.tie.combine(&self.member_lengths()?)
    }

    /// Renders this header's bytes for the `tie_index`'th step of its
    /// own field tie.
    pub fn render(&self, tie_index: u32) -> Vec<u8> {
        let mut bytes = self.base.clone();
        if self.fields.is_empty() {
            return bytes;
        }

        let member_lengths: Vec<usize> = self
            .fields
            .iter()
            .map(|field| field.modifier.len().unwrap_or(1))
            .collect();

        for (member, field) in self.fields.iter().enumerate() {
            let index = self.tie.member_index(tie_index, &member_lengths, member);
            let value = field.modifier.value_at(index);
            let end = field.offset + field.width;
            if end <= bytes.len() {
                bytes[field.offset..end].copy_from_slice(&value);
            }
        }

        bytes
    }
}

/// The length policy attached to a packet template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPolicy {
    Fixed(u16),
    List,
    Sequence,
}

#[derive(Debug, Clone)]
pub struct PacketTemplate {
    pub protocols: Vec<ProtocolTemplate>,
    pub tie: Tie,
}

impl PacketTemplate {
    fn member_lengths(&self) -> Result<Vec<usize>, Error> {
        self.protocols.iter().map(|proto| proto.expansion_len().map(|len| len as usize)).collect()
    }

    /// The total number of distinct frames this template expands to.
    pub fn expansion_len(&self) -> Result<u32, Error> {
        if self.protocols.is_empty() {
            return Ok(0);
        }
        self.tie.combine(&self.member_lengths()?)
    }

    /// Renders the `index`'th expanded frame by concatenating each
    /// protocol header's render at its tie-selected member index.
    pub fn render(&self, index: u32) -> Vec<u8> {
        let member_lengths: Vec<usize> = self
            .protocols
            .iter()
            .map(|proto| proto.expansion_len().unwrap_or(1) as usize)
            .collect();

        let mut frame = Vec::new();
        for (member, proto) in self.protocols.iter().enumerate() {
            let proto_index = self.tie.member_index(index, &member_lengths, member) as u32;
            frame.extend(proto.render(proto_index));
        }
        frame
    }

    /// Renders every expanded frame, in order.
    pub fn expand(&self) -> Result<Vec<Vec<u8>>, Error> {
        let total = self.expansion_len()?;
        Ok((0..total).map(|index| self.render(index)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_tie_length_is_the_lcm_of_member_counts() {
        let tie = Tie::Zip;
        assert_eq!(tie.combine(&[2, 3]).unwrap(), 6);
        assert_eq!(tie.combine(&[4, 6]).unwrap(), 12);
    }

    #[test]
    fn cartesian_tie_length_is_the_product_of_member_counts() {
        let tie = Tie::Cartesian;
        assert_eq!(tie.combine(&[2, 3]).unwrap(), 6);
        assert_eq!(tie.combine(&[4, 4, 4]).unwrap(), 64);
    }

    #[test]
    fn cartesian_tie_overflowing_a_32_bit_counter_is_index_overflow() {
        let tie = Tie::Cartesian;
        assert_eq!(tie.combine(&[1 << 16, 1 << 16, 2]), Err(Error::IndexOverflow));
    }

    #[test]
    fn a_sequence_modifier_expands_to_the_expected_value_at_each_index() {
        let modifier = Modifier::Sequence { start: 10, stop: 14, skip: 2, width: 1 };
        assert_eq!(modifier.len().unwrap(), 3);
        assert_eq!(modifier.value_at(0), vec![10]);
        assert_eq!(modifier.value_at(1), vec![12]);
        assert_eq!(modifier.value_at(2), vec![14]);
    }

    #[test]
    fn cartesian_protocol_with_two_fields_covers_every_combination() {
        let proto = ProtocolTemplate {
            base: vec![0, 0],
            fields: vec![
                FieldModifier { offset: 0, width: 1, modifier: Modifier::List(vec![vec![1], vec![2]]) },
                FieldModifier { offset: 1, width: 1, modifier: Modifier::List(vec![vec![9], vec![8]]) },
            ],
            tie: Tie::Cartesian,
        };

        assert_eq!(proto.expansion_len().unwrap(), 4);
        let rendered: Vec<Vec<u8>> = (0..4).map(|i| proto.render(i)).collect();
        assert_eq!(rendered, vec![vec![1, 9], vec![1, 8], vec![2, 9], vec![2, 8]]);
    }
}
