/// Errors raised while packing or unpacking a [`crate::FramedPacket`].
///
/// Kept as a hand-written enum in the style of the session-layer errors this
/// protocol stack is built around, rather than pulled in from a derive crate.
pub enum CodecError {
    /// `version` did not match [`crate::PROTOCOL_VERSION`].
    BadVersion(u8),
    /// `type` was outside `0..TYPE_MAX`.
    BadType(u8),
    /// On-wire length did not equal `header_size + payload_size`.
    LengthMismatch { expected: usize, actual: usize },
    /// The buffer was too short to even contain a header.
    Truncated,
    /// `src_addr` equaled this node's own address (loopback).
    Loopback,
    /// Caller-supplied payload would not fit in a single frame.
    PayloadTooLarge(usize),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadVersion(v) => write!(f, "bad protocol version: {}", v),
            Self::BadType(t) => write!(f, "packet type out of range: {}", t),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "frame length mismatch: expected {}, got {}", expected, actual)
            }
            Self::Truncated => f.write_str("frame shorter than header size"),
            Self::Loopback => f.write_str("frame originated from this node"),
            Self::PayloadTooLarge(n) => write!(f, "payload of {} bytes exceeds max frame size", n),
        }
    }
}

impl std::fmt::Debug for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for CodecError {}
