//! Single-producer/single-consumer byte and record rings in shared memory.
//!
//! A [`stream::StreamChannel`] carries an ordered byte stream (the
//! transport for `SOCK_STREAM` sockets); a [`datagram::DatagramChannel`]
//! carries length-delimited records with an optional source/destination
//! address (the transport for `SOCK_DGRAM`, `SOCK_RAW`, and packet
//! sockets). Both are built from a pair of single-direction rings backed
//! by an [`arena::Arena`], so a channel's storage is owned by the arena and
//! merely referenced — never owned — by the socket and client-side handles
//! that sit on either end of it.

pub mod datagram;
pub mod notify;
pub mod stream;

pub use datagram::{Address, ClientDatagramEnd, DatagramChannel, ServerDatagramEnd};
pub use notify::{CountingNotifier, Notifier};
pub use stream::{ClientStreamEnd, ServerStreamEnd, StreamChannel};

#[cfg(target_os = "linux")]
pub use notify::EventFdNotifier;
