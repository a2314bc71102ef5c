use crate::bitmap::STRIPE_BYTES;
use crate::error::OtaError;

/// Reported job state, carried in `STATUS.error_code` (spec §4.G/§7).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum StatusCode {
    InProgress = 0,
    Finish = 1,
    Stop = 2,
    FirmwareNotInit = 3,
}

impl StatusCode {
    fn from_u8(v: u8) -> Result<Self, OtaError> {
        match v {
            0 => Ok(Self::InProgress),
            1 => Ok(Self::Finish),
            2 => Ok(Self::Stop),
            3 => Ok(Self::FirmwareNotInit),
            _ => Err(OtaError::InvalidArg),
        }
    }
}

/// `STATUS` payload, spec §4.G: `{ sha256[16], error_code, packet_num,
/// total_size, written_size, progress_index, progress_array[0..200] }`. The
/// progress stripe is optional — only attached when the sender actually has
/// bitmap detail to report (spec: "~52 bytes + optional progress stripe").
#[derive(Clone, Debug)]
pub struct StatusMsg {
    pub sha256: [u8; 16],
    pub error_code: StatusCode,
    pub packet_num: u16,
    pub total_size: u32,
    pub written_size: u32,
    pub progress_index: u16,
    pub stripe: Option<[u8; STRIPE_BYTES]>,
}

impl StatusMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(30 + STRIPE_BYTES);
        out.extend_from_slice(&self.sha256);
        out.push(self.error_code as u8);
        out.extend_from_slice(&self.packet_num.to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.extend_from_slice(&self.written_size.to_le_bytes());
        out.extend_from_slice(&self.progress_index.to_le_bytes());
        match &self.stripe {
            Some(stripe) => {
                out.push(1);
                out.extend_from_slice(stripe);
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, OtaError> {
        if payload.len() < 30 {
            return Err(OtaError::InvalidArg);
        }
        let mut sha256 = [0u8; 16];
        sha256.copy_from_slice(&payload[0..16]);
        let error_code = StatusCode::from_u8(payload[16])?;
        let packet_num = u16::from_le_bytes([payload[17], payload[18]]);
        let total_size = u32::from_le_bytes(payload[19..23].try_into().unwrap());
        let written_size = u32::from_le_bytes(payload[23..27].try_into().unwrap());
        let progress_index = u16::from_le_bytes([payload[27], payload[28]]);
        let has_stripe = payload[29] != 0;
        let stripe = if has_stripe {
            if payload.len() < 30 + STRIPE_BYTES {
                return Err(OtaError::InvalidArg);
            }
            let mut s = [0u8; STRIPE_BYTES];
            s.copy_from_slice(&payload[30..30 + STRIPE_BYTES]);
            Some(s)
        } else {
            None
        };
        Ok(Self {
            sha256,
            error_code,
            packet_num,
            total_size,
            written_size,
            progress_index,
            stripe,
        })
    }
}

/// `DATA` payload, spec §4.G: `{ seq: u16, size: u8, data[226] }`.
#[derive(Clone, Debug)]
pub struct DataMsg {
    pub seq: u16,
    pub data: Vec<u8>,
}

impl DataMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.data.len());
        out.extend_from_slice(&self.seq.to_le_bytes());
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, OtaError> {
        if payload.len() < 3 {
            return Err(OtaError::InvalidArg);
        }
        let seq = u16::from_le_bytes([payload[0], payload[1]]);
        let size = payload[2] as usize;
        if payload.len() < 3 + size {
            return Err(OtaError::InvalidArg);
        }
        Ok(Self {
            seq,
            data: payload[3..3 + size].to_vec(),
        })
    }
}
