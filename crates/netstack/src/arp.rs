//! ARP and neighbor-discovery caches, queryable and insertable under the
//! same single-threaded discipline as every other stack-thread
//! operation.

use std::net::{Ipv4Addr, Ipv6Addr};

use ahash::AHashMap;
use fib::InterfaceId;

#[derive(Default)]
pub struct ArpCache {
    entries: AHashMap<(InterfaceId, Ipv4Addr), [u8; 6]>,
}

impl ArpCache {
    pub fn insert(&mut self, interface: InterfaceId, address: Ipv4Addr, mac: [u8; 6]) {
        self.entries.insert((interface, address), mac);
    }

    pub fn lookup(&self, interface: InterfaceId, address: Ipv4Addr) -> Option<[u8; 6]> {
        self.entries.get(&(interface, address)).copied()
    }

    pub fn remove(&mut self, interface: InterfaceId, address: Ipv4Addr) {
        self.entries.remove(&(interface, address));
    }
}

#[derive(Default)]
pub struct NdCache {
    entries: AHashMap<(InterfaceId, Ipv6Addr), [u8; 6]>,
}

impl NdCache {
    pub fn insert(&mut self, interface: InterfaceId, address: Ipv6Addr, mac: [u8; 6]) {
        self.entries.insert((interface, address), mac);
    }

    pub fn lookup(&self, interface: InterfaceId, address: Ipv6Addr) -> Option<[u8; 6]> {
        self.entries.get(&(interface, address)).copied()
    }

    pub fn remove(&mut self, interface: InterfaceId, address: Ipv6Addr) {
        self.entries.remove(&(interface, address));
    }
}
