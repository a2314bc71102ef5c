/// Transport-layer errors, spec §7.
pub enum TransportError {
    InvalidArg,
    NotInit,
    Timeout,
    NoMem,
    UnknownPeer,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArg => f.write_str("invalid argument"),
            Self::NotInit => f.write_str("transport not initialized"),
            Self::Timeout => f.write_str("operation timed out"),
            Self::NoMem => f.write_str("allocation failure"),
            Self::UnknownPeer => f.write_str("destination is not a known peer"),
        }
    }
}

impl std::fmt::Debug for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for TransportError {}
