use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

type Aes128Ctr = Ctr128BE<aes::Aes128>;

/// One side's Curve25519 endpoint for the key-handshake (spec §4.F/§9).
/// Uses `StaticSecret` rather than `EphemeralSecret` because the protocol
/// needs to perform the ECDH step after further messages have been
/// exchanged, and `EphemeralSecret` is consumed by its first use.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Little-endian wire bytes, matching spec §6's "mpi integers are
    /// written little-endian" rule (Curve25519 byte order already matches
    /// little-endian convention, unlike mbedTLS's big-endian `mpi`).
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_public);
        self.secret.diffie_hellman(&peer).to_bytes()
    }
}

/// `SHA-256(PoP)` XOR'd into the raw ECDH output, binding the session to
/// proof-of-possession (spec §4.F/§6).
pub fn pop_mask(shared_secret: &[u8; 32], pop: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(pop);
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = shared_secret[i] ^ digest[i];
    }
    out
}

/// Convenience wrapper combining ECDH and the PoP mask in one call.
pub fn ecdh_shared_secret(pair: &EphemeralKeyPair, peer_public: &[u8; 32], pop: &[u8]) -> [u8; 32] {
    pop_mask(&pair.diffie_hellman(peer_public), pop)
}

/// AES-128-CTR "verifier cipher" keyed with the masked shared secret `k`
/// and nonce `device_random`, applied to `plaintext` (spec §4.F: `enc_ver =
/// AES-CTR(k, rand_d, Q_d)`, `check_c = AES-CTR(k, rand_d, Q_d)`, etc).
/// CTR mode makes this the same operation for both directions.
pub fn ctr_verifier(k: &[u8; 32], device_random: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    // Only the low 128 bits of k key the AES-128 block cipher; the upper
    // half still contributed to binding via the XOR in pop_mask.
    let mut cipher = Aes128Ctr::new(k[0..16].into(), device_random.into());
    let mut buf = plaintext.to_vec();
    cipher.apply_keystream(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_is_symmetric_once_pop_masked() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let pop = b"shared-secret-string";
        let sa = ecdh_shared_secret(&a, &b.public_bytes(), pop);
        let sb = ecdh_shared_secret(&b, &a.public_bytes(), pop);
        assert_eq!(sa, sb);
    }

    #[test]
    fn mismatched_pop_breaks_the_binding() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let sa = ecdh_shared_secret(&a, &b.public_bytes(), b"hello");
        let sb = ecdh_shared_secret(&b, &a.public_bytes(), b"HELLO");
        assert_ne!(sa, sb);
    }

    #[test]
    fn ctr_verifier_round_trips_through_reapplication() {
        let k = [7u8; 32];
        let nonce = [1u8; 16];
        let plaintext = b"device-public-key-material------";
        let ct = ctr_verifier(&k, &nonce, plaintext);
        let pt = ctr_verifier(&k, &nonce, &ct);
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn different_device_random_changes_ciphertext() {
        let k = [7u8; 32];
        let plaintext = b"same-plaintext-bytes-here------";
        let ct1 = ctr_verifier(&k, &[1u8; 16], plaintext);
        let ct2 = ctr_verifier(&k, &[2u8; 16], plaintext);
        assert_ne!(ct1, ct2);
    }
}
