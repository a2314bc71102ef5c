/// Crypto-layer errors. Hand-written in the style of this stack's other
/// session-layer error enums rather than derived.
pub enum CryptoError {
    /// GCM tag did not verify; caller MUST drop the frame.
    AeadFail,
    /// Ciphertext shorter than IV + tag, so it cannot possibly be valid.
    Truncated,
    /// No application key has been installed yet.
    KeyNotInstalled,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AeadFail => f.write_str("AEAD authentication failed"),
            Self::Truncated => f.write_str("ciphertext too short to contain IV and tag"),
            Self::KeyNotInstalled => f.write_str("no application key installed"),
        }
    }
}

impl std::fmt::Debug for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for CryptoError {}
