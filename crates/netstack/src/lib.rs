//! The TCP/IP stack adapter (spec §4.5): interface configuration and
//! validation, PCB lifecycle, the netif extension map, checksum-offload
//! mask wiring, and the dedicated stack thread other threads submit
//! work to.

pub mod arp;
pub mod checksum;
pub mod config;
pub mod error;
pub mod extension;
pub mod interface;
pub mod loopback;
pub mod pcb;
pub mod stack;

pub use arp::{ArpCache, NdCache};
pub use checksum::{ChecksumMask, stack_masks};
pub use config::{AddressMode, EthernetConfig, InterfaceConfig, Ipv4Config, Ipv6Config};
pub use error::Error;
pub use extension::{ExtensionMap, NetifExtension};
pub use interface::{Interface, InterfaceState, InterfaceStats};
pub use loopback::LoopbackStack;
pub use pcb::{Pcb, PcbId, PcbKind, PcbOptions, TcpState};
pub use stack::{NetStack, StackHandle, StackThread};
