use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;

use crate::error::CryptoError;

/// Size of the persistent key material, spec §3: "48 bytes = 32-byte key ||
/// 16-byte IV". The trailing 16 bytes here are only a randomization seed
/// recorded at generation time; every send draws a fresh IV (spec §4.E).
pub const APP_KEY_LEN: usize = 48;
pub const IV_LEN: usize = 16;
pub const AUTH_TAG_LEN: usize = 16;

type Aes256Gcm16 = AesGcm<aes::Aes256, U16>;

/// 48-byte persisted application key: 32-byte AES-256 key plus a 16-byte
/// seed used only to initialize the IV randomization (spec §3/§6).
#[derive(Clone, Copy)]
pub struct ApplicationKey {
    pub key: [u8; 32],
    pub iv_seed: [u8; 16],
}

impl ApplicationKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        let mut iv_seed = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut iv_seed);
        Self { key, iv_seed }
    }

    pub fn to_bytes(self) -> [u8; APP_KEY_LEN] {
        let mut out = [0u8; APP_KEY_LEN];
        out[0..32].copy_from_slice(&self.key);
        out[32..48].copy_from_slice(&self.iv_seed);
        out
    }

    pub fn from_bytes(b: &[u8; APP_KEY_LEN]) -> Self {
        let mut key = [0u8; 32];
        let mut iv_seed = [0u8; 16];
        key.copy_from_slice(&b[0..32]);
        iv_seed.copy_from_slice(&b[32..48]);
        Self { key, iv_seed }
    }
}

/// AES-256-GCM AEAD wrapper with a 128-bit tag and a 16-byte IV trailing
/// every secure frame's payload (spec §4.E). The key is the persistent
/// 32-byte application key; the IV is freshly randomized on every
/// `auth_encrypt` call and recovered by the receiver from the wire.
pub struct SecuritySession {
    cipher: Aes256Gcm16,
}

impl SecuritySession {
    pub fn new(key: &ApplicationKey) -> Self {
        Self {
            cipher: Aes256Gcm16::new_from_slice(&key.key).expect("32-byte key"),
        }
    }

    /// Encrypts `plaintext`, returning `ciphertext || tag || iv` — matching
    /// spec §4.D's `frame.payload = ciphertext || iv` once the caller
    /// appends the already-embedded tag produced by the AEAD construction.
    pub fn auth_encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);
        let ct = self.cipher.encrypt(nonce, plaintext).expect("encryption is infallible for valid key size");
        let mut out = Vec::with_capacity(ct.len() + IV_LEN);
        out.extend_from_slice(&ct);
        out.extend_from_slice(&iv);
        out
    }

    /// Expects `ciphertext_and_tag || iv` as produced by `auth_encrypt`.
    /// Returns [`CryptoError::AeadFail`] if the tag does not verify; the
    /// caller MUST drop the frame on failure rather than act on partial
    /// output (spec §4.E).
    pub fn auth_decrypt(&self, wire: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if wire.len() < IV_LEN + AUTH_TAG_LEN {
            return Err(CryptoError::Truncated);
        }
        let (ct_and_tag, iv) = wire.split_at(wire.len() - IV_LEN);
        let nonce = Nonce::from_slice(iv);
        self.cipher.decrypt(nonce, ct_and_tag).map_err(|_| CryptoError::AeadFail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_payloads_up_to_usable_max() {
        let key = ApplicationKey::generate();
        let session = SecuritySession::new(&key);
        // spec §6: secure payload usable size = 230 - 16 (iv) - 16 (tag) = 198
        let plaintext = vec![0x42u8; 198];
        let wire = session.auth_encrypt(&plaintext);
        let recovered = session.auth_decrypt(&wire).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn bit_flip_in_ciphertext_fails_auth() {
        let key = ApplicationKey::generate();
        let session = SecuritySession::new(&key);
        let mut wire = session.auth_encrypt(b"top secret ota key material");
        wire[0] ^= 0x01;
        assert!(matches!(session.auth_decrypt(&wire), Err(CryptoError::AeadFail)));
    }

    #[test]
    fn each_call_uses_a_fresh_iv() {
        let key = ApplicationKey::generate();
        let session = SecuritySession::new(&key);
        let a = session.auth_encrypt(b"same plaintext");
        let b = session.auth_encrypt(b"same plaintext");
        assert_ne!(a, b, "identical plaintexts must not produce identical wire bytes");
    }
}
