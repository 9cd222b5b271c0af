//! Protocol control blocks: the BSD-socket-shaped state the stack keeps
//! per open socket (spec §4.5, "PCB" in the glossary).

use std::net::SocketAddr;

pub type PcbId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcbKind {
    Raw,
    Udp,
    Tcp,
    Packet,
}

/// TCP's BSD state machine. Meaningless for the other PCB kinds, which
/// stay `Closed` for their whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// Per-PCB options (spec data model): TTL, checksum offset, multicast
/// membership, linger, and the 256-bit ICMP type filter bitmap.
#[derive(Debug, Clone)]
pub struct PcbOptions {
    pub ttl: u8,
    pub tos: u8,
    pub multicast_loop: bool,
    pub checksum_offset: Option<u16>,
    pub multicast_memberships: Vec<std::net::IpAddr>,
    pub linger: Option<std::time::Duration>,
    pub icmp_filter: [u64; 4],
    pub v6_multicast_hops: u8,
    pub v6_multicast_loop: bool,
    pub v6_only: bool,
    pub v6_checksum_offset: Option<u16>,
}

impl Default for PcbOptions {
    fn default() -> Self {
        Self {
            ttl: 64,
            tos: 0,
            multicast_loop: true,
            checksum_offset: None,
            multicast_memberships: Vec::new(),
            linger: None,
            // All-zero: the BSD ICMP_FILTER convention this bitmap follows
            // blocks a type by setting its bit, so the all-clear mask
            // passes every type until a socket narrows it with setsockopt.
            icmp_filter: [0; 4],
            v6_multicast_hops: 1,
            v6_multicast_loop: true,
            v6_only: false,
            v6_checksum_offset: None,
        }
    }
}

impl PcbOptions {
    /// `true` when `icmp_type` is allowed through to the channel, i.e.
    /// its bit in the filter is *not* set (spec §4.6: "an inbound ICMP
    /// frame whose type bit is set is dropped").
    pub fn allows_icmp_type(&self, icmp_type: u8) -> bool {
        let word = (icmp_type / 64) as usize;
        let bit = icmp_type % 64;
        self.icmp_filter[word] & (1 << bit) == 0
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8, allow: bool) {
        let word = (icmp_type / 64) as usize;
        let bit = icmp_type % 64;
        if !allow {
            self.icmp_filter[word] |= 1 << bit;
        } else {
            self.icmp_filter[word] &= !(1 << bit);
        }
    }
}

/// A protocol control block: local/remote address, protocol number,
/// TCP state, options, and the id of the channel this PCB's data
/// flows through (resolved by the socket server, not this crate).
pub struct Pcb {
    pub id: PcbId,
    pub kind: PcbKind,
    pub protocol: Option<u8>,
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
    pub state: TcpState,
    pub options: PcbOptions,
    pub channel_id: Option<u64>,
    pub listen_backlog: Vec<PcbId>,
    pub backlog_limit: usize,
}

impl Pcb {
    pub fn new(id: PcbId, kind: PcbKind) -> Self {
        Self {
            id,
            kind,
            protocol: None,
            local: None,
            remote: None,
            state: TcpState::Closed,
            options: PcbOptions::default(),
            channel_id: None,
            listen_backlog: Vec::new(),
            backlog_limit: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icmp_filter_defaults_to_allow_all() {
        let options = PcbOptions::default();
        assert!(options.allows_icmp_type(0));
        assert!(options.allows_icmp_type(255));
    }

    #[test]
    fn icmp_filter_can_be_narrowed_per_type() {
        let mut options = PcbOptions::default();
        for t in 0u16..256 {
            options.set_icmp_type(t as u8, false);
        }
        options.set_icmp_type(8, true);
        options.set_icmp_type(0, true);

        assert!(options.allows_icmp_type(8));
        assert!(options.allows_icmp_type(0));
        assert!(!options.allows_icmp_type(13));
    }
}
