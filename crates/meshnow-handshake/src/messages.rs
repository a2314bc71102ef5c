use crate::error::HandshakeError;

/// Sub-kind byte distinguishing the handshake messages multiplexed onto
/// `SecStatus` (SCAN/INFO) and `Sec` (everything else) packet types.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum MsgKind {
    Scan = 0,
    Info = 1,
    Cmd0 = 2,
    Resp0 = 3,
    Cmd1 = 4,
    Resp1 = 5,
    Key = 6,
    KeyResp = 7,
    Rest = 8,
}

impl MsgKind {
    fn from_u8(v: u8) -> Result<Self, HandshakeError> {
        match v {
            0 => Ok(Self::Scan),
            1 => Ok(Self::Info),
            2 => Ok(Self::Cmd0),
            3 => Ok(Self::Resp0),
            4 => Ok(Self::Cmd1),
            5 => Ok(Self::Resp1),
            6 => Ok(Self::Key),
            7 => Ok(Self::KeyResp),
            8 => Ok(Self::Rest),
            _ => Err(HandshakeError::InvalidArg),
        }
    }
}

/// One decoded handshake-protocol message, spec §4.F sequence diagram.
/// All multi-byte integers and Curve25519 mpi fields are little-endian
/// (spec §6: "the implementation flips from mbedTLS's big-endian
/// representation").
#[derive(Clone, Debug)]
pub enum HandshakeMsg {
    Scan,
    Info { sec_ver: u8 },
    Cmd0 { q_c: [u8; 32] },
    Resp0 { q_d: [u8; 32], rand_d: [u8; 16] },
    Cmd1 { check_c: [u8; 32] },
    Resp1 { check_d: [u8; 32] },
    Key { enc_app_key: [u8; 48] },
    KeyResp,
    Rest,
}

impl HandshakeMsg {
    pub fn kind(&self) -> MsgKind {
        match self {
            Self::Scan => MsgKind::Scan,
            Self::Info { .. } => MsgKind::Info,
            Self::Cmd0 { .. } => MsgKind::Cmd0,
            Self::Resp0 { .. } => MsgKind::Resp0,
            Self::Cmd1 { .. } => MsgKind::Cmd1,
            Self::Resp1 { .. } => MsgKind::Resp1,
            Self::Key { .. } => MsgKind::Key,
            Self::KeyResp => MsgKind::KeyResp,
            Self::Rest => MsgKind::Rest,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind() as u8];
        match self {
            Self::Scan | Self::KeyResp | Self::Rest => {}
            Self::Info { sec_ver } => out.push(*sec_ver),
            Self::Cmd0 { q_c } => out.extend_from_slice(q_c),
            Self::Resp0 { q_d, rand_d } => {
                out.extend_from_slice(q_d);
                out.extend_from_slice(rand_d);
            }
            Self::Cmd1 { check_c } => out.extend_from_slice(check_c),
            Self::Resp1 { check_d } => out.extend_from_slice(check_d),
            Self::Key { enc_app_key } => out.extend_from_slice(enc_app_key),
        }
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, HandshakeError> {
        let kind = *payload.first().ok_or(HandshakeError::InvalidArg)?;
        let kind = MsgKind::from_u8(kind)?;
        let rest = &payload[1..];
        Ok(match kind {
            MsgKind::Scan => Self::Scan,
            MsgKind::Info => Self::Info {
                sec_ver: *rest.first().ok_or(HandshakeError::InvalidArg)?,
            },
            MsgKind::Cmd0 => Self::Cmd0 { q_c: take32(rest)? },
            MsgKind::Resp0 => {
                if rest.len() < 48 {
                    return Err(HandshakeError::InvalidArg);
                }
                let mut q_d = [0u8; 32];
                let mut rand_d = [0u8; 16];
                q_d.copy_from_slice(&rest[0..32]);
                rand_d.copy_from_slice(&rest[32..48]);
                Self::Resp0 { q_d, rand_d }
            }
            MsgKind::Cmd1 => Self::Cmd1 { check_c: take32(rest)? },
            MsgKind::Resp1 => Self::Resp1 { check_d: take32(rest)? },
            MsgKind::Key => {
                if rest.len() < 48 {
                    return Err(HandshakeError::InvalidArg);
                }
                let mut enc_app_key = [0u8; 48];
                enc_app_key.copy_from_slice(&rest[0..48]);
                Self::Key { enc_app_key }
            }
            MsgKind::KeyResp => Self::KeyResp,
            MsgKind::Rest => Self::Rest,
        })
    }
}

fn take32(rest: &[u8]) -> Result<[u8; 32], HandshakeError> {
    if rest.len() < 32 {
        return Err(HandshakeError::InvalidArg);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&rest[0..32]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd0_round_trips() {
        let msg = HandshakeMsg::Cmd0 { q_c: [7u8; 32] };
        let wire = msg.encode();
        let decoded = HandshakeMsg::decode(&wire).unwrap();
        assert!(matches!(decoded, HandshakeMsg::Cmd0 { q_c } if q_c == [7u8; 32]));
    }

    #[test]
    fn resp0_round_trips() {
        let msg = HandshakeMsg::Resp0 { q_d: [1u8; 32], rand_d: [2u8; 16] };
        let decoded = HandshakeMsg::decode(&msg.encode()).unwrap();
        assert!(matches!(decoded, HandshakeMsg::Resp0 { q_d, rand_d } if q_d == [1u8; 32] && rand_d == [2u8; 16]));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        assert!(matches!(HandshakeMsg::decode(&[MsgKind::Cmd0 as u8, 1, 2]), Err(HandshakeError::InvalidArg)));
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(HandshakeMsg::decode(&[]), Err(HandshakeError::InvalidArg)));
    }
}
