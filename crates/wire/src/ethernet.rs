//! Ethernet II framing, with optional 802.1Q VLAN tags and an MPLS
//! label stack between the Ethernet header and the payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::Error;

pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_MPLS_UNICAST: u16 = 0x8847;
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const HEADER_LEN: usize = 14;

/// One 802.1Q tag: priority (3 bits), drop-eligible (1 bit), and a
/// 12-bit VLAN id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    pub priority: u8,
    pub drop_eligible: bool,
    pub vlan_id: u16,
}

impl VlanTag {
    fn tci(&self) -> u16 {
        ((self.priority as u16 & 0x7) << 13) | ((self.drop_eligible as u16) << 12) | (self.vlan_id & 0x0fff)
    }

    fn from_tci(tci: u16) -> Self {
        Self {
            priority: ((tci >> 13) & 0x7) as u8,
            drop_eligible: (tci >> 12) & 0x1 != 0,
            vlan_id: tci & 0x0fff,
        }
    }
}

/// One MPLS label stack entry: 20-bit label, 3-bit traffic class, the
/// bottom-of-stack bit, and an 8-bit TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MplsLabel {
    pub label: u32,
    pub traffic_class: u8,
    pub bottom_of_stack: bool,
    pub ttl: u8,
}

impl MplsLabel {
    fn encode(&self, buf: &mut BytesMut) {
        let word = ((self.label & 0x000f_ffff) << 12)
            | ((self.traffic_class as u32 & 0x7) << 9)
            | ((self.bottom_of_stack as u32) << 8);
        buf.put_u32(word | self.ttl as u32);
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooShort);
        }
        let word = buf.get_u32();
        Ok(Self {
            label: (word >> 12) & 0x000f_ffff,
            traffic_class: ((word >> 9) & 0x7) as u8,
            bottom_of_stack: (word >> 8) & 0x1 != 0,
            ttl: (word & 0xff) as u8,
        })
    }
}

/// An Ethernet II header plus whatever VLAN tags and MPLS labels sit
/// between it and the payload's own ethertype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub vlan_tags: Vec<VlanTag>,
    pub mpls_labels: Vec<MplsLabel>,
    pub payload_ethertype: u16,
}

impl EthernetHeader {
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.vlan_tags.len() * 4 + self.mpls_labels.len() * 4
    }

    /// # Test
    ///
    /// ```
    /// use openperf_wire::ethernet::{EthernetHeader, ETHERTYPE_IPV4};
    ///
    /// let header = EthernetHeader {
    ///     destination: [0x02, 0, 0, 0, 0, 1],
    ///     source: [0x02, 0, 0, 0, 0, 2],
    ///     vlan_tags: Vec::new(),
    ///     mpls_labels: Vec::new(),
    ///     payload_ethertype: ETHERTYPE_IPV4,
    /// };
    ///
    /// let mut buf = bytes::BytesMut::new();
    /// header.encode(&mut buf);
    /// assert_eq!(buf.len(), 14);
    /// assert_eq!(&buf[12..14], &[0x08, 0x00]);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.destination);
        buf.put_slice(&self.source);

        for tag in &self.vlan_tags {
            buf.put_u16(ETHERTYPE_VLAN);
            buf.put_u16(tag.tci());
        }

        if !self.mpls_labels.is_empty() {
            buf.put_u16(ETHERTYPE_MPLS_UNICAST);
            for label in &self.mpls_labels {
                label.encode(buf);
            }
        }

        buf.put_u16(self.payload_ethertype);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < HEADER_LEN {
            return Err(Error::BufferTooShort);
        }

        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        buf.copy_to_slice(&mut destination);
        buf.copy_to_slice(&mut source);

        let mut vlan_tags = Vec::new();
        let mut ethertype = buf.get_u16();

        while ethertype == ETHERTYPE_VLAN {
            if buf.remaining() < 2 {
                return Err(Error::BufferTooShort);
            }
            vlan_tags.push(VlanTag::from_tci(buf.get_u16()));
            if buf.remaining() < 2 {
                return Err(Error::BufferTooShort);
            }
            ethertype = buf.get_u16();
        }

        let mut mpls_labels = Vec::new();
        if ethertype == ETHERTYPE_MPLS_UNICAST {
            loop {
                let label = MplsLabel::decode(buf)?;
                let bottom = label.bottom_of_stack;
                mpls_labels.push(label);
                if bottom {
                    break;
                }
            }
            if buf.remaining() < 2 {
                return Err(Error::BufferTooShort);
            }
            ethertype = buf.get_u16();
        }

        Ok(Self {
            destination,
            source,
            vlan_tags,
            mpls_labels,
            payload_ethertype: ethertype,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_vlan_tag() {
        let header = EthernetHeader {
            destination: [1, 2, 3, 4, 5, 6],
            source: [6, 5, 4, 3, 2, 1],
            vlan_tags: vec![VlanTag {
                priority: 5,
                drop_eligible: true,
                vlan_id: 100,
            }],
            mpls_labels: Vec::new(),
            payload_ethertype: ETHERTYPE_IPV4,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let mut cursor = &buf[..];
        let decoded = EthernetHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn round_trips_through_an_mpls_label_stack() {
        let header = EthernetHeader {
            destination: [1, 2, 3, 4, 5, 6],
            source: [6, 5, 4, 3, 2, 1],
            vlan_tags: Vec::new(),
            mpls_labels: vec![
                MplsLabel {
                    label: 100,
                    traffic_class: 2,
                    bottom_of_stack: false,
                    ttl: 64,
                },
                MplsLabel {
                    label: 200,
                    traffic_class: 0,
                    bottom_of_stack: true,
                    ttl: 63,
                },
            ],
            payload_ethertype: ETHERTYPE_IPV4,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let mut cursor = &buf[..];
        let decoded = EthernetHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
    }
}
