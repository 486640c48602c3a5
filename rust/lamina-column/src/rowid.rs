//! Row identifiers and their block-index/offset encoding.
//!
//! A row id packs the owning block index into its upper 16 bits and the
//! in-block offset into its lower 16 bits. Block capacity is fixed at 65536
//! rows, so the split is exact and every valid offset fits the low half.
//! Point reads, delta indexes and block materialization all rely on this
//! encoding.

/// Locator of a single row within a column: block index in the upper 16 bits,
/// in-block offset in the lower 16.
pub type RowId = u32;

/// Number of rows a single column block can hold.
pub const BLOCK_CAPACITY: usize = 65536;

/// Returns the index of the block holding `rid`.
#[inline]
pub fn block_index(rid: RowId) -> u32 {
    rid >> 16
}

/// Returns the offset of `rid` within its block.
#[inline]
pub fn block_offset(rid: RowId) -> u32 {
    rid & 0xFFFF
}

/// Composes a row id from a block index and an in-block offset.
#[inline]
pub fn from_parts(block: u32, offset: u32) -> RowId {
    debug_assert!(offset < BLOCK_CAPACITY as u32);
    (block << 16) | offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trip() {
        for rid in [0u32, 1, 65535, 65536, 65537, 0x0003_0102, u32::MAX] {
            let bid = block_index(rid);
            let off = block_offset(rid);
            assert!(off < BLOCK_CAPACITY as u32);
            assert_eq!(from_parts(bid, off), rid);
        }
    }

    #[test]
    fn test_block_boundaries() {
        assert_eq!(block_index(65535), 0);
        assert_eq!(block_offset(65535), 65535);
        assert_eq!(block_index(65536), 1);
        assert_eq!(block_offset(65536), 0);
    }
}
