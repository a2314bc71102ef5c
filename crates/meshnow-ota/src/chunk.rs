/// Fixed OTA chunk size, spec §6.
pub const CHUNK_SIZE: usize = 226;

/// `packet_num = ⌈total/226⌉` (spec §4.G).
pub fn packet_num(total_size: u32) -> u16 {
    ((total_size as usize + CHUNK_SIZE - 1) / CHUNK_SIZE) as u16
}

/// Size in bytes of chunk `seq` of an image `total_size` bytes long; the
/// last chunk is shorter. `offset > total_size` saturates to 0 rather than
/// underflowing — callers must still reject out-of-range `seq` themselves
/// (spec §4.G "Reject if seq * 226 > total_size"), this is a backstop only.
pub fn chunk_len(seq: u16, total_size: u32) -> usize {
    let offset = seq as usize * CHUNK_SIZE;
    (total_size as usize).saturating_sub(offset).min(CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_thousand_bytes_is_forty_five_chunks() {
        // A 10,000-byte image at the fixed 226-byte chunk size is 45 chunks
        // (44 full chunks of 226 plus a 56-byte remainder: 44*226 = 9944).
        assert_eq!(packet_num(10_000), 45);
        assert_eq!(chunk_len(44, 10_000), 56);
        assert_eq!(chunk_len(0, 10_000), CHUNK_SIZE);
    }

    #[test]
    fn out_of_range_offset_saturates_instead_of_underflowing() {
        // seq == packet_num is one past the last valid chunk; the caller is
        // expected to reject this before calling chunk_len, but the
        // arithmetic itself must not panic if that guard ever regresses.
        assert_eq!(chunk_len(45, 10_000), 0);
        assert_eq!(chunk_len(u16::MAX, 10_000), 0);
    }
}
