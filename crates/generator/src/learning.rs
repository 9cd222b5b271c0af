//! ARP/ND next-hop learning (spec §4.7): before a generator starts, it
//! resolves the set of IPv4/IPv6 next-hop addresses its sequence will
//! reach, submits one query per address to the stack thread, then
//! polls the stack's caches until every address resolves or the poll
//! budget is exhausted.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fib::InterfaceId;
use netstack::StackHandle;

pub const POLL_CHECK_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_COUNT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unresolved,
    Resolving,
    Resolved,
    TimedOut,
}

/// Reduces a generator's raw destination set to the next hops it must
/// actually resolve, per the three cases in spec §4.7.
pub fn next_hops(destinations: &[IpAddr], gateway: Option<Ipv4Addr>, netmask: Option<Ipv4Addr>) -> Vec<IpAddr> {
    destinations
        .iter()
        .map(|destination| match (destination, gateway, netmask) {
            (IpAddr::V4(addr), Some(gateway), Some(netmask)) => {
                let on_link = u32::from(*addr) & u32::from(netmask) == u32::from(gateway) & u32::from(netmask);
                if on_link { *destination } else { IpAddr::V4(gateway) }
            }
            _ => *destination,
        })
        .collect()
}

/// The result a caller reads once learning for one address has
/// settled (or timed out): the address's current state and, if
/// resolved, the MAC it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub state: State,
    pub mac: Option<[u8; 6]>,
}

/// Shared, thread-safe view into an in-progress (or finished) learning
/// run. The background thread owns the only writer; readers (the
/// caller assembling a [`crate::source::TrafficSource`]) only ever
/// see a consistent snapshot.
#[derive(Clone)]
pub struct LearningHandle {
    results: Arc<Mutex<HashMap<IpAddr, Resolution>>>,
    done: Arc<std::sync::atomic::AtomicBool>,
}

impl LearningHandle {
    pub fn is_done(&self) -> bool {
        self.done.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn resolution(&self, address: IpAddr) -> Resolution {
        self.results
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or(Resolution { state: State::Unresolved, mac: None })
    }

    /// Blocks the calling thread until every address has settled
    /// (resolved or timed out). Intended for callers (like the unit
    /// tests) that want the synchronous view of a run already known
    /// to be finite.
    pub fn join(self) {
        while !self.is_done() {
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn macs_in_order(&self, addresses: &[IpAddr]) -> Vec<[u8; 6]> {
        addresses
            .iter()
            .map(|address| self.resolution(*address).mac.unwrap_or([0u8; 6]))
            .collect()
    }
}

/// Looks up `address` in the stack's ARP or ND cache, whichever its
/// family selects.
fn lookup(stack: &StackHandle, interface: InterfaceId, address: IpAddr) -> Option<[u8; 6]> {
    stack
        .submit(move |net| match address {
            IpAddr::V4(addr) => net.arp().lookup(interface, addr),
            IpAddr::V6(addr) => net.nd().lookup(interface, addr),
        })
        .ok()
        .flatten()
}

/// Submits one ARP query (or ND neighbor solicitation) per address.
/// The actual frame construction and transmission is the caller's
/// job — `emit_query` is handed one address at a time and is expected
/// to push the resulting frame onto whatever TX path reaches the
/// interface; this module only drives the state machine and polls
/// the resulting cache entries.
pub fn resolve(
    interface: InterfaceId,
    addresses: Vec<IpAddr>,
    stack: StackHandle,
    mut emit_query: impl FnMut(IpAddr) + Send + 'static,
) -> LearningHandle {
    let results = Arc::new(Mutex::new(
        addresses
            .iter()
            .map(|address| (*address, Resolution { state: State::Unresolved, mac: None }))
            .collect::<HashMap<_, _>>(),
    ));
    let done = Arc::new(std::sync::atomic::AtomicBool::new(addresses.is_empty()));

    let handle = LearningHandle { results: results.clone(), done: done.clone() };

    if addresses.is_empty() {
        return handle;
    }

    thread::spawn(move || {
        for address in &addresses {
            emit_query(*address);
            results.lock().unwrap().insert(*address, Resolution { state: State::Resolving, mac: None });
        }

        for _ in 0..MAX_POLL_COUNT {
            let mut all_resolved = true;
            {
                let mut guard = results.lock().unwrap();
                for address in &addresses {
                    if guard.get(address).map(|r| r.state) == Some(State::Resolved) {
                        continue;
                    }
                    match lookup(&stack, interface, *address) {
                        Some(mac) => {
                            guard.insert(*address, Resolution { state: State::Resolved, mac: Some(mac) });
                        }
                        None => all_resolved = false,
                    }
                }
            }

            if all_resolved {
                break;
            }

            thread::sleep(POLL_CHECK_INTERVAL);
        }

        {
            let mut guard = results.lock().unwrap();
            for address in &addresses {
                let entry = guard.entry(*address).or_insert(Resolution { state: State::Unresolved, mac: None });
                if entry.state != State::Resolved {
                    entry.state = State::TimedOut;
                    entry.mac = None;
                }
            }
        }

        done.store(true, std::sync::atomic::Ordering::Release);
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstack::{LoopbackStack, StackThread};
    use std::net::Ipv4Addr;

    #[test]
    fn on_link_destination_with_gateway_passes_through() {
        let destinations = vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))];
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let netmask = Ipv4Addr::new(255, 255, 255, 0);

        assert_eq!(next_hops(&destinations, Some(gateway), Some(netmask)), destinations);
    }

    #[test]
    fn off_link_destination_is_replaced_by_the_gateway() {
        let destinations = vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))];
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let netmask = Ipv4Addr::new(255, 255, 255, 0);

        assert_eq!(next_hops(&destinations, Some(gateway), Some(netmask)), vec![IpAddr::V4(gateway)]);
    }

    #[test]
    fn without_a_responder_learning_times_out_with_a_zero_mac_fallback() {
        let (_thread, handle) = StackThread::spawn(Box::new(LoopbackStack::new()));
        let address = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

        let learning = resolve(0, vec![address], handle, |_| {});
        learning.clone().join();

        let resolution = learning.resolution(address);
        assert_eq!(resolution.state, State::TimedOut);
        assert_eq!(learning.macs_in_order(&[address]), vec![[0u8; 6]]);
    }
}
