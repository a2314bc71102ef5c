use rand::RngCore;

use crate::error::CodecError;
use crate::mac::Mac;

/// Compile-time wire format version. Frames carrying any other value are rejected.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size in bytes of the fixed portion of a frame: type byte, length byte,
/// 6-byte frame_head, 6-byte dest, 6-byte src.
pub const HEADER_SIZE: usize = 1 + 1 + 6 + 6 + 6;

/// Hard ceiling imposed by the link-layer primitive.
pub const MAX_FRAME_SIZE: usize = 250;

/// Largest payload that fits after the header.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Marker value for `channel` meaning "iterate every channel the country
/// record knows about" rather than a concrete channel number.
pub const CHANNEL_ALL: u8 = 15;

/// Marker value for `forward_ttl` meaning "unlimited hops" (never decremented).
pub const FORWARD_TTL_UNLIMITED: u8 = 31;

/// Packet types that multiplex the shared link layer. Kept to 8 of the 16
/// values the 4-bit `type` field can hold; the rest are reserved for
/// host-registered channels added later.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum PacketType {
    /// Generic host application data.
    Data = 0,
    /// Acknowledgement of a unicast frame that set the `ack` bit.
    Ack = 1,
    /// Group membership announcement/update.
    Group = 2,
    /// Internal re-broadcast of an already-framed packet; never (re-)encrypted.
    Forward = 3,
    /// Lightweight handshake discovery/status exchange (SCAN/INFO).
    SecStatus = 4,
    /// Key-handshake protocol messages (CMD0/RESP0/CMD1/RESP1/KEY/KEY_RESP/REST).
    Sec = 5,
    /// OTA progress/status polling.
    OtaStatus = 6,
    /// OTA firmware chunk.
    OtaData = 7,
}

pub const TYPE_MAX: u8 = 8;

impl PacketType {
    pub fn from_u8(v: u8) -> Result<Self, CodecError> {
        match v {
            0 => Ok(Self::Data),
            1 => Ok(Self::Ack),
            2 => Ok(Self::Group),
            3 => Ok(Self::Forward),
            4 => Ok(Self::SecStatus),
            5 => Ok(Self::Sec),
            6 => Ok(Self::OtaStatus),
            7 => Ok(Self::OtaData),
            other => Err(CodecError::BadType(other)),
        }
    }

    /// Types whose payload is never AEAD-encrypted even if the caller asks
    /// for `security`, because they either carry the handshake itself or
    /// are purely transport-internal (spec §4.D).
    pub fn bypasses_encryption(self) -> bool {
        matches!(self, Self::Ack | Self::Forward | Self::SecStatus | Self::Sec)
    }
}

/// The 6-byte `frame_head` block: magic, channel/filter bits, retransmit and
/// forwarding controls.
#[derive(Clone, Copy, Debug)]
pub struct FrameHead {
    pub magic: u16,
    pub channel: u8,
    pub filter_adjacent_channel: bool,
    pub filter_weak_signal: bool,
    pub security: bool,
    pub broadcast: bool,
    pub group: bool,
    pub ack: bool,
    pub retransmit_count: u8,
    pub forward_ttl: u8,
    pub forward_rssi: i8,
}

impl Default for FrameHead {
    fn default() -> Self {
        Self {
            magic: 0,
            channel: 0,
            filter_adjacent_channel: false,
            filter_weak_signal: false,
            security: false,
            broadcast: true,
            group: false,
            ack: false,
            retransmit_count: 10,
            forward_ttl: 0,
            forward_rssi: i8::MIN,
        }
    }
}

impl FrameHead {
    pub fn pack(&self, out: &mut [u8; 6]) {
        out[0..2].copy_from_slice(&self.magic.to_le_bytes());
        let mut b = self.channel & 0x0f;
        if self.filter_adjacent_channel {
            b |= 1 << 4;
        }
        if self.filter_weak_signal {
            b |= 1 << 5;
        }
        if self.security {
            b |= 1 << 6;
        }
        if self.broadcast {
            b |= 1 << 7;
        }
        out[2] = b;

        let mut c = 0u8;
        if self.group {
            c |= 1;
        }
        if self.ack {
            c |= 1 << 1;
        }
        c |= (self.retransmit_count & 0x1f) << 2;
        out[3] = c;

        out[4] = self.forward_ttl & 0x1f;
        out[5] = self.forward_rssi as u8;
    }

    pub fn unpack(raw: &[u8; 6]) -> Self {
        let magic = u16::from_le_bytes([raw[0], raw[1]]);
        let b = raw[2];
        let c = raw[3];
        Self {
            magic,
            channel: b & 0x0f,
            filter_adjacent_channel: b & (1 << 4) != 0,
            filter_weak_signal: b & (1 << 5) != 0,
            security: b & (1 << 6) != 0,
            broadcast: b & (1 << 7) != 0,
            group: c & 1 != 0,
            ack: c & (1 << 1) != 0,
            retransmit_count: (c >> 2) & 0x1f,
            forward_ttl: raw[4] & 0x1f,
            forward_rssi: raw[5] as i8,
        }
    }
}

/// Per-send options the caller may override; defaults match spec §4.A
/// (`broadcast=true, retransmit_count=10`).
#[derive(Clone, Copy, Debug)]
pub struct FrameConfig {
    pub channel: u8,
    pub filter_adjacent_channel: bool,
    pub filter_weak_signal: bool,
    pub security: bool,
    pub broadcast: bool,
    pub group: bool,
    pub ack: bool,
    pub retransmit_count: u8,
    pub forward_ttl: u8,
    pub forward_rssi: i8,
    /// 0 means "assign a fresh random magic".
    pub magic: u16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        let h = FrameHead::default();
        Self {
            channel: h.channel,
            filter_adjacent_channel: h.filter_adjacent_channel,
            filter_weak_signal: h.filter_weak_signal,
            security: h.security,
            broadcast: h.broadcast,
            group: h.group,
            ack: h.ack,
            retransmit_count: h.retransmit_count,
            forward_ttl: h.forward_ttl,
            forward_rssi: h.forward_rssi,
            magic: 0,
        }
    }
}

/// A fully decoded (or about-to-be-encoded) on-wire frame.
#[derive(Clone, Debug)]
pub struct FramedPacket {
    pub packet_type: PacketType,
    pub head: FrameHead,
    pub dest_addr: Mac,
    pub src_addr: Mac,
    pub payload: Vec<u8>,
}

impl FramedPacket {
    /// Build and serialize a frame. `magic` is filled with a fresh random
    /// value if the config's magic is 0 (spec §4.A). `retransmit_count`
    /// defaults to 1 if the config left it at 0 (spec §4.D send path).
    pub fn encode(
        packet_type: PacketType,
        dest_addr: Mac,
        src_addr: Mac,
        payload: &[u8],
        mut cfg: FrameConfig,
    ) -> Result<(Vec<u8>, FramedPacket), CodecError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge(payload.len()));
        }
        if cfg.magic == 0 {
            cfg.magic = random_nonzero_u16();
        }
        if cfg.retransmit_count == 0 {
            cfg.retransmit_count = 1;
        }

        let head = FrameHead {
            magic: cfg.magic,
            channel: cfg.channel,
            filter_adjacent_channel: cfg.filter_adjacent_channel,
            filter_weak_signal: cfg.filter_weak_signal,
            security: cfg.security,
            broadcast: cfg.broadcast,
            group: cfg.group,
            ack: cfg.ack,
            retransmit_count: cfg.retransmit_count,
            forward_ttl: cfg.forward_ttl,
            forward_rssi: cfg.forward_rssi,
        };

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.push((PROTOCOL_VERSION & 0x03) | ((packet_type as u8 & 0x0f) << 2));
        buf.push(payload.len() as u8);
        let mut head_bytes = [0u8; 6];
        head.pack(&mut head_bytes);
        buf.extend_from_slice(&head_bytes);
        buf.extend_from_slice(dest_addr.as_bytes());
        buf.extend_from_slice(src_addr.as_bytes());
        buf.extend_from_slice(payload);

        let packet = FramedPacket {
            packet_type,
            head,
            dest_addr,
            src_addr,
            payload: payload.to_vec(),
        };
        Ok((buf, packet))
    }

    /// Validate and unpack an on-wire frame. `self_mac` enforces the
    /// loopback-protection invariant (src != self).
    pub fn decode(raw: &[u8], self_mac: Mac) -> Result<Self, CodecError> {
        if raw.len() < HEADER_SIZE {
            return Err(CodecError::Truncated);
        }
        let version = raw[0] & 0x03;
        if version != PROTOCOL_VERSION {
            return Err(CodecError::BadVersion(version));
        }
        let type_bits = (raw[0] >> 2) & 0x0f;
        let packet_type = PacketType::from_u8(type_bits)?;

        let payload_size = raw[1] as usize;
        if raw.len() != HEADER_SIZE + payload_size {
            return Err(CodecError::LengthMismatch {
                expected: HEADER_SIZE + payload_size,
                actual: raw.len(),
            });
        }

        let mut head_raw = [0u8; 6];
        head_raw.copy_from_slice(&raw[2..8]);
        let head = FrameHead::unpack(&head_raw);

        let mut dest = [0u8; 6];
        dest.copy_from_slice(&raw[8..14]);
        let mut src = [0u8; 6];
        src.copy_from_slice(&raw[14..20]);
        let src_addr = Mac::new(src);

        if src_addr == self_mac {
            return Err(CodecError::Loopback);
        }

        Ok(FramedPacket {
            packet_type,
            head,
            dest_addr: Mac::new(dest),
            src_addr,
            payload: raw[HEADER_SIZE..].to_vec(),
        })
    }
}

fn random_nonzero_u16() -> u16 {
    loop {
        let v = rand::thread_rng().next_u32() as u16;
        if v != 0 {
            return v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let dest = Mac::new([1, 2, 3, 4, 5, 6]);
        let src = Mac::new([9, 9, 9, 9, 9, 9]);
        let cfg = FrameConfig {
            ack: true,
            retransmit_count: 5,
            forward_ttl: 3,
            forward_rssi: -70,
            magic: 1234,
            ..Default::default()
        };
        let (bytes, built) = FramedPacket::encode(PacketType::Data, dest, src, b"hello", cfg).unwrap();
        let decoded = FramedPacket::decode(&bytes, Mac::new([0; 6])).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Data);
        assert_eq!(decoded.head.magic, 1234);
        assert!(decoded.head.ack);
        assert_eq!(decoded.head.retransmit_count, 5);
        assert_eq!(decoded.head.forward_ttl, 3);
        assert_eq!(decoded.head.forward_rssi, -70);
        assert_eq!(decoded.dest_addr, dest);
        assert_eq!(decoded.src_addr, src);
        assert_eq!(decoded.payload, b"hello");
        assert_eq!(built.head.magic, 1234);
    }

    #[test]
    fn zero_magic_is_randomized() {
        let dest = Mac::BROADCAST;
        let src = Mac::new([1; 6]);
        let (_, a) = FramedPacket::encode(PacketType::Data, dest, src, &[], FrameConfig::default()).unwrap();
        let (_, b) = FramedPacket::encode(PacketType::Data, dest, src, &[], FrameConfig::default()).unwrap();
        assert_ne!(a.head.magic, 0);
        assert_ne!(b.head.magic, 0);
    }

    #[test]
    fn rejects_loopback() {
        let me = Mac::new([7; 6]);
        let (bytes, _) = FramedPacket::encode(PacketType::Data, Mac::BROADCAST, me, &[], FrameConfig::default()).unwrap();
        assert!(matches!(FramedPacket::decode(&bytes, me), Err(CodecError::Loopback)));
    }

    #[test]
    fn rejects_bad_version() {
        let mut raw = vec![0u8; HEADER_SIZE];
        raw[0] = 0x03; // version bits = 3, never valid since PROTOCOL_VERSION=1
        assert!(matches!(FramedPacket::decode(&raw, Mac::default()), Err(CodecError::BadVersion(3))));
    }

    #[test]
    fn header_size_matches_max_payload_math() {
        // spec: max payload = 250 - 20 header bytes = 230
        assert_eq!(HEADER_SIZE, 20);
        assert_eq!(MAX_PAYLOAD_SIZE, 230);
    }

    #[test]
    fn payload_too_large_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let res = FramedPacket::encode(PacketType::Data, Mac::BROADCAST, Mac::default(), &payload, FrameConfig::default());
        assert!(matches!(res, Err(CodecError::PayloadTooLarge(_))));
    }
}
