/// Key-handshake errors, spec §7.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    InvalidArg,
    InvalidState,
    Timeout,
    DeviceNoExist,
    SendPacketLoss,
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArg => f.write_str("invalid argument"),
            Self::InvalidState => f.write_str("handshake message arrived in the wrong session state"),
            Self::Timeout => f.write_str("handshake round timed out"),
            Self::DeviceNoExist => f.write_str("no responder answered the scan"),
            Self::SendPacketLoss => f.write_str("handshake batch finished with unfinished responders"),
        }
    }
}

impl std::fmt::Debug for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for HandshakeError {}
