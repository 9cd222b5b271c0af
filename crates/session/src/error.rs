//! The socket server's error kinds (spec §7): a fourteen-variant
//! enumeration shared by every request handler. Errors that arise on
//! the stack thread come back through [`netstack::StackHandle::submit`]
//! and collapse into one of these; errors returned from a client
//! request become the `errno` the client shim exposes (`sdk`/`src`
//! own that mapping — this crate only names the kind).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Invalid,
    NotFound,
    NotSocket,
    NotConn,
    AlreadyExists,
    OutOfMemory,
    OutOfRange,
    Corrupted,
    DoubleFree,
    Again,
    NoProtoOpt,
    Timeout,
    IndexOverflow,
    Internal,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Invalid => "invalid request",
            Self::NotFound => "unknown id",
            Self::NotSocket => "wrong kind for operation",
            Self::NotConn => "operation requires a connected state",
            Self::AlreadyExists => "duplicate id or double bind",
            Self::OutOfMemory => "arena or ring exhausted",
            Self::OutOfRange => "pointer outside arena",
            Self::Corrupted => "tag sentinel mismatch",
            Self::DoubleFree => "double free",
            Self::Again => "would block",
            Self::NoProtoOpt => "unknown socket option",
            Self::Timeout => "learning or stack call timed out",
            Self::IndexOverflow => "generator expansion exceeded counter",
            Self::Internal => "unclassified stack error",
        };
        write!(f, "{text}")
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

impl From<arena::Error> for Error {
    fn from(error: arena::Error) -> Self {
        match error {
            arena::Error::OutOfMemory => Self::OutOfMemory,
            arena::Error::OutOfRange => Self::OutOfRange,
            arena::Error::Corrupted => Self::Corrupted,
            arena::Error::DoubleFree => Self::DoubleFree,
        }
    }
}

impl From<channel::datagram::Error> for Error {
    fn from(_: channel::datagram::Error) -> Self {
        Self::Invalid
    }
}

impl From<netstack::Error> for Error {
    fn from(error: netstack::Error) -> Self {
        match error {
            netstack::Error::InvalidEthernetConfig
            | netstack::Error::InvalidIpv4Config(_)
            | netstack::Error::InvalidIpv6Config(_) => Self::Invalid,
            netstack::Error::UnknownInterface | netstack::Error::UnknownPcb => Self::NotFound,
            netstack::Error::NotConnected => Self::NotConn,
            netstack::Error::AlreadyBound => Self::AlreadyExists,
            netstack::Error::ListenBacklogFull => Self::Again,
            netstack::Error::StackThreadGone => Self::Internal,
        }
    }
}
