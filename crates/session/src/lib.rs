//! The socket server (C6, spec §4.6): a Unix control socket that
//! speaks a fixed request/reply protocol, a per-client [`Handler`]
//! owning that client's open sockets, and the BSD-socket-shaped state
//! machines each socket kind drives its PCB through.

pub mod codec;
pub mod error;
pub mod handler;
pub mod options;
pub mod ports;
pub mod pump;
pub mod server;
pub mod socket;
pub mod wire;

pub use error::{Error, Result};
pub use handler::Handler;
pub use server::Server;
