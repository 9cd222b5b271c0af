#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidEthernetConfig,
    InvalidIpv4Config(String),
    InvalidIpv6Config(String),
    UnknownInterface,
    UnknownPcb,
    NotConnected,
    AlreadyBound,
    ListenBacklogFull,
    StackThreadGone,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidEthernetConfig => write!(f, "ethernet config must carry a unicast, non-broadcast MAC"),
            Error::InvalidIpv4Config(reason) => write!(f, "invalid ipv4 config: {reason}"),
            Error::InvalidIpv6Config(reason) => write!(f, "invalid ipv6 config: {reason}"),
            Error::UnknownInterface => write!(f, "unknown interface"),
            Error::UnknownPcb => write!(f, "unknown pcb"),
            Error::NotConnected => write!(f, "pcb is not connected"),
            Error::AlreadyBound => write!(f, "pcb is already bound"),
            Error::ListenBacklogFull => write!(f, "listen backlog full"),
            Error::StackThreadGone => write!(f, "stack thread is no longer running"),
        }
    }
}
