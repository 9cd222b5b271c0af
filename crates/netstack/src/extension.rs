//! Auxiliary per-interface data the underlying stack does not natively
//! carry (spec §4.5 item 2). Lookups and mutations run on the stack
//! thread along with everything else.

use std::net::Ipv6Addr;

use ahash::AHashMap;
use fib::InterfaceId;

#[derive(Default, Clone)]
pub struct NetifExtension {
    pub ipv6_prefix_lengths: AHashMap<Ipv6Addr, u8>,
    pub ipv6_default_gateway: Option<Ipv6Addr>,
}

#[derive(Default)]
pub struct ExtensionMap {
    entries: AHashMap<InterfaceId, NetifExtension>,
}

impl ExtensionMap {
    pub fn get(&self, interface: InterfaceId) -> NetifExtension {
        self.entries.get(&interface).cloned().unwrap_or_default()
    }

    pub fn set_prefix_length(&mut self, interface: InterfaceId, address: Ipv6Addr, prefix_len: u8) {
        self.entries.entry(interface).or_default().ipv6_prefix_lengths.insert(address, prefix_len);
    }

    pub fn set_default_gateway(&mut self, interface: InterfaceId, gateway: Option<Ipv6Addr>) {
        self.entries.entry(interface).or_default().ipv6_default_gateway = gateway;
    }

    pub fn remove(&mut self, interface: InterfaceId) {
        self.entries.remove(&interface);
    }
}
