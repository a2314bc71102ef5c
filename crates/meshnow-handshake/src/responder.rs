use meshnow_crypto::{ctr_verifier, ecdh_shared_secret, ApplicationKey, EphemeralKeyPair};
use meshnow_wire::Mac;
use rand::RngCore;

use crate::error::HandshakeError;
use crate::messages::HandshakeMsg;

/// A responder's view of the handshake state, spec §4.F `SecuritySession`.
/// Named distinctly from [`meshnow_crypto::SecuritySession`] (the AEAD
/// layer this handshake ultimately provisions) to keep the two concerns
/// textually separate even though the spec uses one name for both.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    /// No client bound; the responder will accept the next `CMD0`.
    Idle,
    /// `RESP0` sent; the round that follows `CMD0` has completed.
    WaitResp0,
    /// `RESP1` sent; the round that follows `CMD1` has completed.
    WaitResp1,
    /// `KEY_RESP` sent; the application key is installed.
    Done,
}

/// One responder's handshake session. A responder holds exactly one client
/// MAC at a time; a `CMD0` from a different MAC while a session is active is
/// ignored until the current session reaches `Done` or is reset by `REST`
/// (spec §4.F).
pub struct HandshakeResponder {
    pop: Vec<u8>,
    state: SessionState,
    client_mac: Option<Mac>,
    keypair: Option<EphemeralKeyPair>,
    rand_d: [u8; 16],
    sym_key: [u8; 32],
    q_c: [u8; 32],
}

impl HandshakeResponder {
    pub fn new(pop: impl Into<Vec<u8>>) -> Self {
        Self {
            pop: pop.into(),
            state: SessionState::Idle,
            client_mac: None,
            keypair: None,
            rand_d: [0; 16],
            sym_key: [0; 32],
            q_c: [0; 32],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.client_mac = None;
        self.keypair = None;
    }

    /// Answers a `SCAN`/`INFO` probe. Responders never initiate this
    /// themselves; the initiator broadcasts `SCAN` and collects `INFO`
    /// replies (spec §4.F: "scanning phase is a broadcast REQUEST").
    pub fn handle_scan(&self, src: Mac, me: Mac, sec_ver: u8) -> Option<HandshakeMsg> {
        if src == me {
            return None;
        }
        Some(HandshakeMsg::Info { sec_ver })
    }

    /// `CMD0: Q_c` → generate `(d_d, Q_d, rand_d)`, derive `k`, reply
    /// `RESP0: Q_d, rand_d` (spec §4.F sequence diagram).
    pub fn handle_cmd0(&mut self, src: Mac, q_c: [u8; 32]) -> Result<HandshakeMsg, HandshakeError> {
        if let Some(existing) = self.client_mac {
            if existing != src && self.state != SessionState::Idle {
                return Err(HandshakeError::InvalidState);
            }
        }

        let keypair = EphemeralKeyPair::generate();
        let mut rand_d = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut rand_d);
        let sym_key = ecdh_shared_secret(&keypair, &q_c, &self.pop);
        let q_d = keypair.public_bytes();

        self.client_mac = Some(src);
        self.q_c = q_c;
        self.rand_d = rand_d;
        self.sym_key = sym_key;
        self.keypair = Some(keypair);
        self.state = SessionState::WaitResp0;

        Ok(HandshakeMsg::Resp0 { q_d, rand_d })
    }

    /// `CMD1: check_c` → verify against `enc_ver`, reply `RESP1: check_d`
    /// (spec §4.F). Returns [`HandshakeError::InvalidState`] on a PoP
    /// mismatch or an out-of-order arrival, matching spec scenario S5.
    pub fn handle_cmd1(&mut self, src: Mac, check_c: [u8; 32]) -> Result<HandshakeMsg, HandshakeError> {
        if self.state != SessionState::WaitResp0 || self.client_mac != Some(src) {
            self.reset();
            return Err(HandshakeError::InvalidState);
        }
        let keypair = self.keypair.as_ref().ok_or(HandshakeError::InvalidState)?;
        let q_d = keypair.public_bytes();
        let enc_ver = ctr_verifier(&self.sym_key, &self.rand_d, &q_d);
        if enc_ver != check_c {
            self.reset();
            return Err(HandshakeError::InvalidState);
        }
        let check_d = ctr_verifier(&self.sym_key, &self.rand_d, &self.q_c);
        let mut out = [0u8; 32];
        out.copy_from_slice(&check_d);
        self.state = SessionState::WaitResp1;
        Ok(HandshakeMsg::Resp1 { check_d: out })
    }

    /// `KEY = Enc_k(app_key)` → decrypt, install, reply `KEY_RESP`.
    pub fn handle_key(&mut self, src: Mac, enc_app_key: [u8; 48]) -> Result<(HandshakeMsg, ApplicationKey), HandshakeError> {
        if self.state != SessionState::WaitResp1 || self.client_mac != Some(src) {
            self.reset();
            return Err(HandshakeError::InvalidState);
        }
        let plain = ctr_verifier(&self.sym_key, &self.rand_d, &enc_app_key);
        let mut key_bytes = [0u8; 48];
        key_bytes.copy_from_slice(&plain);
        self.state = SessionState::Done;
        Ok((HandshakeMsg::KeyResp, ApplicationKey::from_bytes(&key_bytes)))
    }

    /// `REST` clears the active session unconditionally.
    pub fn handle_rest(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_exchange(pop_init: &str, pop_resp: &str) -> Result<ApplicationKey, HandshakeError> {
        let initiator_kp = EphemeralKeyPair::generate();
        let q_c = initiator_kp.public_bytes();
        let mut responder = HandshakeResponder::new(pop_resp.as_bytes());

        let client = Mac::new([1; 6]);
        let resp0 = responder.handle_cmd0(client, q_c).unwrap();
        let (q_d, rand_d) = match resp0 {
            HandshakeMsg::Resp0 { q_d, rand_d } => (q_d, rand_d),
            _ => unreachable!(),
        };

        let k_init = ecdh_shared_secret(&initiator_kp, &q_d, pop_init.as_bytes());
        let check_c = ctr_verifier(&k_init, &rand_d, &q_d);
        let mut check_c_arr = [0u8; 32];
        check_c_arr.copy_from_slice(&check_c);

        let resp1 = responder.handle_cmd1(client, check_c_arr)?;
        let check_d = match resp1 {
            HandshakeMsg::Resp1 { check_d } => check_d,
            _ => unreachable!(),
        };
        let expect_check_d = ctr_verifier(&k_init, &rand_d, &q_c);
        assert_eq!(&check_d[..], &expect_check_d[..], "initiator-side verification also fails on PoP mismatch");

        let app_key = ApplicationKey::generate();
        let enc = ctr_verifier(&k_init, &rand_d, &app_key.to_bytes());
        let mut enc_arr = [0u8; 48];
        enc_arr.copy_from_slice(&enc);

        let (_key_resp, installed) = responder.handle_key(client, enc_arr)?;
        assert_eq!(responder.state(), SessionState::Done);
        assert_eq!(installed.key, app_key.key);
        Ok(installed)
    }

    #[test]
    fn matching_pop_completes_handshake() {
        assert!(full_exchange("hello", "hello").is_ok());
    }

    #[test]
    fn mismatched_pop_fails_at_resp1_like_scenario_s5() {
        // PoP mismatch makes k differ, so check_c computed by the initiator
        // never matches enc_ver the responder derived from its own k.
        let err = full_exchange("hello", "HELLO").unwrap_err();
        assert_eq!(err, HandshakeError::InvalidState);
    }

    #[test]
    fn cmd1_out_of_order_is_rejected() {
        let mut responder = HandshakeResponder::new(b"pop".as_slice());
        let client = Mac::new([2; 6]);
        assert!(matches!(responder.handle_cmd1(client, [0; 32]), Err(HandshakeError::InvalidState)));
    }

    #[test]
    fn rest_clears_session() {
        let mut responder = HandshakeResponder::new(b"pop".as_slice());
        let client = Mac::new([3; 6]);
        let initiator_kp = EphemeralKeyPair::generate();
        responder.handle_cmd0(client, initiator_kp.public_bytes()).unwrap();
        assert_eq!(responder.state(), SessionState::WaitResp0);
        responder.handle_rest();
        assert_eq!(responder.state(), SessionState::Idle);
    }
}
