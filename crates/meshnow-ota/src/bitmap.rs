/// Bytes per progress stripe, spec §6 ("Progress stripe: 200 bytes per
/// STATUS packet (1600 bits)").
pub const STRIPE_BYTES: usize = 200;
pub const STRIPE_BITS: usize = STRIPE_BYTES * 8;

/// Bit-addressed OTA progress bitmap (spec §3/§4.G: `bitmap[seq/8] & (1 <<
/// (seq%8))`), paged into 200-byte stripes so a single STATUS packet can
/// carry progress for images larger than 1600 chunks.
#[derive(Clone, Debug)]
pub struct Bitmap {
    bits: Vec<u8>,
    total_chunks: usize,
}

impl Bitmap {
    pub fn zeros(total_chunks: usize) -> Self {
        Self {
            bits: vec![0u8; (total_chunks + 7) / 8],
            total_chunks,
        }
    }

    /// All bits set to 1, used by the initiator to seed its "does everyone
    /// already have this chunk" accumulator (spec §4.G: "set progress_bitmap
    /// = all-1").
    pub fn ones(total_chunks: usize) -> Self {
        Self {
            bits: vec![0xffu8; (total_chunks + 7) / 8],
            total_chunks,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn is_set(&self, seq: usize) -> bool {
        self.bits[seq / 8] & (1 << (seq % 8)) != 0
    }

    pub fn set(&mut self, seq: usize) {
        self.bits[seq / 8] |= 1 << (seq % 8);
    }

    pub fn clear(&mut self, seq: usize) {
        self.bits[seq / 8] &= !(1 << (seq % 8));
    }

    pub fn popcount(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn from_bytes(bytes: &[u8], total_chunks: usize) -> Self {
        let mut bits = vec![0u8; (total_chunks + 7) / 8];
        let n = bits.len().min(bytes.len());
        bits[..n].copy_from_slice(&bytes[..n]);
        Self { bits, total_chunks }
    }

    /// Extracts the 200-byte window starting at `progress_index * 200`,
    /// zero-padded past the end of the real bitmap.
    pub fn stripe(&self, progress_index: usize) -> [u8; STRIPE_BYTES] {
        let mut out = [0u8; STRIPE_BYTES];
        let start = progress_index * STRIPE_BYTES;
        for (i, slot) in out.iter_mut().enumerate() {
            if let Some(b) = self.bits.get(start + i) {
                *slot = *b;
            }
        }
        out
    }

    /// AND-merges a received responder stripe into this accumulator at
    /// `progress_index` (spec §4.G: "AND-merge their progress_array into
    /// bitmap").
    pub fn and_merge_stripe(&mut self, stripe: &[u8; STRIPE_BYTES], progress_index: usize) {
        let start = progress_index * STRIPE_BYTES;
        for (i, byte) in stripe.iter().enumerate() {
            if let Some(b) = self.bits.get_mut(start + i) {
                *b &= *byte;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_popcount() {
        let mut bm = Bitmap::zeros(45);
        assert_eq!(bm.popcount(), 0);
        bm.set(0);
        bm.set(44);
        assert!(bm.is_set(0));
        assert!(bm.is_set(44));
        assert!(!bm.is_set(1));
        assert_eq!(bm.popcount(), 2);
    }

    #[test]
    fn and_merge_keeps_only_bits_everyone_has() {
        let mut acc = Bitmap::ones(16);
        let mut responder_a = Bitmap::zeros(16);
        responder_a.set(0);
        responder_a.set(1);
        let mut responder_b = Bitmap::zeros(16);
        responder_b.set(0);

        acc.and_merge_stripe(&responder_a.stripe(0), 0);
        acc.and_merge_stripe(&responder_b.stripe(0), 0);

        assert!(acc.is_set(0)); // both have chunk 0
        assert!(!acc.is_set(1)); // only A has chunk 1
        assert!(!acc.is_set(2)); // neither has it
    }

    #[test]
    fn stripe_round_trips_through_from_bytes() {
        let mut bm = Bitmap::zeros(45);
        bm.set(3);
        bm.set(27);
        let restored = Bitmap::from_bytes(bm.as_bytes(), 45);
        assert!(restored.is_set(3));
        assert!(restored.is_set(27));
        assert!(!restored.is_set(4));
    }
}
