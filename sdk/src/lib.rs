//! # OpenPerf socket server SDK
//!
//! A client for the Unix control socket the socket server (spec §4.6)
//! exposes: connect, open sockets, bind/connect/listen/accept them,
//! and read or write their `setsockopt`/`getsockopt` state, all without
//! linking against the server's own crates.
//!
//! ```no_run
//! use openperf_sdk::Client;
//! use session::wire::{Domain, SockKind};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect("/run/openperf/control.sock")?;
//! let socket = client.socket(Domain::Inet, SockKind::Dgram, 0)?;
//! socket.bind(None)?;
//! let local = socket.getsockname()?;
//! println!("bound to {local:?}");
//! # Ok(())
//! # }
//! ```
//!
//! Each socket carries a pair of raw file descriptors for its
//! shared-memory channel (`Socket::channel_fds`), handed over as
//! `SCM_RIGHTS` ancillary data on the `socket`/`accept` reply. Mapping
//! those descriptors into the data-plane ring types is the data-plane
//! glue layer's job, not this crate's: the server's current arena is
//! a process-local allocation rather than a `memfd`-backed mapping, so
//! there is nothing at those descriptors for an out-of-process client
//! to `mmap` yet (see `DESIGN.md`, "sdk data-plane fds").

mod client;

pub use client::{Client, Socket};
pub use session::error::Error;
pub use session::wire;
