use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{Ipv4Config, Ipv6Config};
use fib::{InterfaceId, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Down,
    Configured,
    Up,
}

#[derive(Default)]
pub struct InterfaceStats {
    pub rx_packets: AtomicU64,
    pub tx_packets: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub rx_errors: AtomicU64,
    pub tx_errors: AtomicU64,
}

impl InterfaceStats {
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

/// A logical L2/L3 endpoint tied to a physical port.
pub struct Interface {
    pub id: InterfaceId,
    pub port: PortId,
    pub mac: [u8; 6],
    pub ipv4: Vec<Ipv4Config>,
    pub ipv6: Vec<Ipv6Config>,
    pub link_local: Option<std::net::Ipv6Addr>,
    pub stats: InterfaceStats,
    pub state: InterfaceState,
    pub link_up: bool,
}

impl Interface {
    pub fn new(id: InterfaceId, port: PortId, mac: [u8; 6]) -> Self {
        Self {
            id,
            port,
            mac,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            link_local: None,
            stats: InterfaceStats::default(),
            state: InterfaceState::Down,
            link_up: false,
        }
    }
}
