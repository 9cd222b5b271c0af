//! Interface configuration records and their validation rules (spec
//! §4.5 item 1).

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Static,
    Auto,
    Dhcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetConfig {
    pub mac: [u8; 6],
}

impl EthernetConfig {
    fn validate(&self) -> Result<(), Error> {
        let is_multicast_or_broadcast = self.mac[0] & 0x01 != 0;
        if is_multicast_or_broadcast {
            return Err(Error::InvalidEthernetConfig);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Config {
    pub mode: AddressMode,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Option<Ipv4Addr>,
}

impl Ipv4Config {
    fn validate(&self) -> Result<(), Error> {
        if self.prefix_len > 32 {
            return Err(Error::InvalidIpv4Config("prefix length exceeds 32".into()));
        }
        if self.address.is_loopback() {
            return Err(Error::InvalidIpv4Config("address is loopback".into()));
        }
        if self.address.is_multicast() {
            return Err(Error::InvalidIpv4Config("address is multicast".into()));
        }
        if let Some(gateway) = self.gateway
            && !same_ipv4_subnet(self.address, gateway, self.prefix_len)
        {
            return Err(Error::InvalidIpv4Config("gateway outside address subnet".into()));
        }
        Ok(())
    }
}

fn same_ipv4_subnet(a: Ipv4Addr, b: Ipv4Addr, prefix_len: u8) -> bool {
    let mask = ipv4_mask(prefix_len);
    (u32::from(a) & mask) == (u32::from(b) & mask)
}

fn ipv4_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Config {
    pub mode: AddressMode,
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub gateway: Option<Ipv6Addr>,
    pub link_local: Option<Ipv6Addr>,
}

impl Ipv6Config {
    fn validate(&self) -> Result<(), Error> {
        if self.prefix_len > 128 {
            return Err(Error::InvalidIpv6Config("prefix length exceeds 128".into()));
        }
        if self.address.is_loopback() {
            return Err(Error::InvalidIpv6Config("address is loopback".into()));
        }
        if self.address.is_multicast() {
            return Err(Error::InvalidIpv6Config("address is multicast".into()));
        }
        if let Some(gateway) = self.gateway
            && !same_ipv6_subnet(self.address, gateway, self.prefix_len)
        {
            return Err(Error::InvalidIpv6Config("gateway outside address subnet".into()));
        }
        if let Some(link_local) = self.link_local
            && !is_link_local(link_local)
        {
            return Err(Error::InvalidIpv6Config("link-local address not in fe80::/10".into()));
        }
        Ok(())
    }
}

fn same_ipv6_subnet(a: Ipv6Addr, b: Ipv6Addr, prefix_len: u8) -> bool {
    let mask = ipv6_mask(prefix_len);
    let a = u128::from(a) & mask;
    let b = u128::from(b) & mask;
    a == b
}

fn ipv6_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len as u32)
    }
}

fn is_link_local(addr: Ipv6Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 0xfe && (octets[1] & 0xc0) == 0x80
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterfaceConfig {
    pub ethernet: Option<EthernetConfig>,
    pub ipv4: Option<Ipv4Config>,
    pub ipv6: Option<Ipv6Config>,
}

impl InterfaceConfig {
    /// Validates every rule in spec §4.5 item 1, exhaustively: exactly
    /// one Ethernet config with a unicast MAC, plus at most one IPv4 and
    /// one IPv6 config each satisfying their own rules.
    pub fn validate(&self) -> Result<(), Error> {
        let ethernet = self.ethernet.ok_or(Error::InvalidEthernetConfig)?;
        ethernet.validate()?;

        if let Some(ipv4) = self.ipv4 {
            ipv4.validate()?;
        }
        if let Some(ipv6) = self.ipv6 {
            ipv6.validate()?;
        }
        Ok(())
    }
}
