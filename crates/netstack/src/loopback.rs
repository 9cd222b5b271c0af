//! A minimal in-process `NetStack` implementation: enough PCB and
//! interface bookkeeping to drive this crate's own tests and the
//! top-level integration tests, without linking a real TCP/IP stack.

use std::collections::VecDeque;
use std::net::SocketAddr;

use ahash::AHashMap;
use fib::{InterfaceId, PortId};

use crate::arp::{ArpCache, NdCache};
use crate::config::InterfaceConfig;
use crate::error::Error;
use crate::extension::ExtensionMap;
use crate::interface::{Interface, InterfaceState};
use crate::pcb::{Pcb, PcbId, PcbKind, TcpState};
use crate::stack::NetStack;

#[derive(Default)]
pub struct LoopbackStack {
    interfaces: AHashMap<InterfaceId, Interface>,
    next_interface_id: InterfaceId,
    pcbs: AHashMap<PcbId, Pcb>,
    next_pcb_id: PcbId,
    inboxes: AHashMap<PcbId, VecDeque<Vec<u8>>>,
    arp: ArpCache,
    nd: NdCache,
    extensions: ExtensionMap,
}

impl LoopbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn interface_mut(&mut self, id: InterfaceId) -> Result<&mut Interface, Error> {
        self.interfaces.get_mut(&id).ok_or(Error::UnknownInterface)
    }

    fn pcb_mut(&mut self, id: PcbId) -> Result<&mut Pcb, Error> {
        self.pcbs.get_mut(&id).ok_or(Error::UnknownPcb)
    }

    /// Finds a listening PCB of the right kind bound to `addr`, used by
    /// the loopback `pcb_connect`/`input` to simulate delivery without a
    /// real network.
    fn find_listener(&self, kind: PcbKind, addr: SocketAddr) -> Option<PcbId> {
        self.pcbs
            .iter()
            .find(|(_, pcb)| pcb.kind == kind && pcb.state == TcpState::Listen && pcb.local == Some(addr))
            .map(|(id, _)| *id)
    }
}

impl NetStack for LoopbackStack {
    fn add_interface(&mut self, config: InterfaceConfig, port: PortId, mac: [u8; 6]) -> Result<InterfaceId, Error> {
        config.validate()?;

        let id = self.next_interface_id;
        self.next_interface_id += 1;

        let mut interface = Interface::new(id, port, mac);
        interface.ipv4.extend(config.ipv4);
        interface.ipv6.extend(config.ipv6);
        interface.link_local = config.ipv6.and_then(|v6| v6.link_local);
        interface.state = InterfaceState::Configured;

        self.interfaces.insert(id, interface);
        Ok(id)
    }

    fn remove_interface(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.interfaces.remove(&interface).ok_or(Error::UnknownInterface)?;
        self.extensions.remove(interface);
        Ok(())
    }

    fn set_up(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.interface_mut(interface)?.state = InterfaceState::Up;
        Ok(())
    }

    fn set_down(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.interface_mut(interface)?.state = InterfaceState::Configured;
        Ok(())
    }

    fn set_link_up(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.interface_mut(interface)?.link_up = true;
        Ok(())
    }

    fn set_link_down(&mut self, interface: InterfaceId) -> Result<(), Error> {
        self.interface_mut(interface)?.link_up = false;
        Ok(())
    }

    fn input(&mut self, interface: InterfaceId, frame: Vec<u8>) -> Result<(), Error> {
        let iface = self.interface_mut(interface)?;
        iface.stats.record_rx(frame.len());
        Ok(())
    }

    fn pcb_new(&mut self, kind: PcbKind) -> PcbId {
        let id = self.next_pcb_id;
        self.next_pcb_id += 1;
        self.pcbs.insert(id, Pcb::new(id, kind));
        self.inboxes.insert(id, VecDeque::new());
        id
    }

    fn pcb_bind(&mut self, pcb: PcbId, addr: SocketAddr) -> Result<(), Error> {
        let pcb = self.pcb_mut(pcb)?;
        if pcb.local.is_some() {
            return Err(Error::AlreadyBound);
        }
        pcb.local = Some(addr);
        Ok(())
    }

    fn pcb_connect(&mut self, pcb: PcbId, addr: SocketAddr) -> Result<(), Error> {
        let kind = self.pcb_mut(pcb)?.kind;
        let listener = self.find_listener(kind, addr);

        let entry = self.pcb_mut(pcb)?;
        entry.remote = Some(addr);
        if kind == PcbKind::Tcp {
            entry.state = TcpState::SynSent;
        }

        if let Some(listener) = listener {
            let backlog_limit = self.pcbs[&listener].backlog_limit;
            let backlog = &mut self.pcbs.get_mut(&listener).unwrap().listen_backlog;
            if backlog.len() >= backlog_limit {
                return Err(Error::ListenBacklogFull);
            }
            backlog.push(pcb);
            self.pcb_mut(pcb)?.state = TcpState::Established;
        }

        Ok(())
    }

    fn pcb_listen(&mut self, pcb: PcbId, backlog: usize) -> Result<(), Error> {
        let entry = self.pcb_mut(pcb)?;
        entry.state = TcpState::Listen;
        entry.backlog_limit = backlog;
        Ok(())
    }

    fn pcb_accept(&mut self, pcb: PcbId) -> Result<Option<PcbId>, Error> {
        let entry = self.pcb_mut(pcb)?;
        Ok(entry.listen_backlog.pop())
    }

    fn pcb_send(&mut self, pcb: PcbId, data: &[u8]) -> Result<usize, Error> {
        let remote = self.pcb_mut(pcb)?.remote.ok_or(Error::NotConnected)?;
        let kind = self.pcb_mut(pcb)?.kind;

        if let Some(peer) = self.find_peer(kind, remote) {
            self.inboxes.entry(peer).or_default().push_back(data.to_vec());
        }

        Ok(data.len())
    }

    fn pcb_recv(&mut self, pcb: PcbId, max: usize) -> Result<Vec<u8>, Error> {
        let inbox = self.inboxes.get_mut(&pcb).ok_or(Error::UnknownPcb)?;
        let Some(mut front) = inbox.pop_front() else {
            return Ok(Vec::new());
        };

        if front.len() > max {
            let remainder = front.split_off(max);
            inbox.push_front(remainder);
        }
        Ok(front)
    }

    fn pcb_close(&mut self, pcb: PcbId) -> Result<(), Error> {
        self.pcbs.remove(&pcb).ok_or(Error::UnknownPcb)?;
        self.inboxes.remove(&pcb);
        Ok(())
    }

    fn arp(&mut self) -> &mut ArpCache {
        &mut self.arp
    }

    fn nd(&mut self) -> &mut NdCache {
        &mut self.nd
    }

    fn extensions(&mut self) -> &mut ExtensionMap {
        &mut self.extensions
    }
}

impl LoopbackStack {
    fn find_peer(&self, kind: PcbKind, addr: SocketAddr) -> Option<PcbId> {
        self.pcbs
            .iter()
            .find(|(_, pcb)| pcb.kind == kind && pcb.local == Some(addr))
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EthernetConfig;

    #[test]
    fn interface_lifecycle_moves_through_configured_then_up() {
        let mut stack = LoopbackStack::new();
        let config = InterfaceConfig {
            ethernet: Some(EthernetConfig { mac: [0x02, 0, 0, 0, 0, 1] }),
            ipv4: None,
            ipv6: None,
        };

        let id = stack.add_interface(config, 0, [0x02, 0, 0, 0, 0, 1]).unwrap();
        assert_eq!(stack.interfaces[&id].state, InterfaceState::Configured);

        stack.set_up(id).unwrap();
        assert_eq!(stack.interfaces[&id].state, InterfaceState::Up);
    }

    #[test]
    fn udp_send_delivers_to_the_bound_peer() {
        let mut stack = LoopbackStack::new();
        let a = stack.pcb_new(PcbKind::Udp);
        let b = stack.pcb_new(PcbKind::Udp);

        let addr_a: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let addr_b: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        stack.pcb_bind(a, addr_a).unwrap();
        stack.pcb_bind(b, addr_b).unwrap();

        stack.pcb_mut(a).unwrap().remote = Some(addr_b);
        stack.pcb_send(a, b"hello").unwrap();

        assert_eq!(stack.pcb_recv(b, 16).unwrap(), b"hello");
    }
}
