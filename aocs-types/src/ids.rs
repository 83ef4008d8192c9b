//! Identifiers and row addressing.
//!
//! A row in a column-oriented table is addressed by the segment file it was appended to and
//! its row number inside that segment. Index machinery built for page-oriented tables instead
//! expects (block, offset) pairs, so [`RowLocator`] also maps onto *logical blocks* of
//! [`TUPLES_PER_LOGICAL_BLOCK`] rows each. Logical blocks never exist on disk.

// FIXME: Same `modular_bitfield` expansion issue seen elsewhere: the generated
// accessors for `RowLocator` trip `unused_parens` on recent toolchains.
#![allow(unused_parens)]

use std::{cmp::Ordering, fmt};

use modular_bitfield::prelude::*;

/// Identifier of a table.
pub type TableId = u16;

/// Segment file number. Segment `0` is reserved for utility-mode writes; regular
/// inserts use `1..`.
pub type SegmentNo = u16;

/// Row number within one segment file.
///
/// Allocated from the per-segment fast sequence, so numbers are unique and increasing but
/// not necessarily dense.
pub type RowNumber = u64;

/// Zero-based position of a column in the table's column list.
pub type ColumnIndex = usize;

/// Command counter within a transaction. Writes from command `n` are visible to the same
/// transaction from command `n + 1` on.
pub type CommandId = u32;

/// Logical block number used when a locator is presented to page-oriented index code.
pub type LogicalBlock = u64;

/// Width of the row-number part of a [`RowLocator`].
pub const ROW_NUMBER_BITS: u32 = 48;

/// Largest representable row number.
pub const MAX_ROW_NUMBER: RowNumber = (1 << ROW_NUMBER_BITS) - 1;

/// Rows per logical block. Matches the maximum offset a page-oriented tuple id can encode.
pub const TUPLES_PER_LOGICAL_BLOCK: u64 = 32_768;

const OFFSET_BITS: u32 = 15;
const OFFSET_MASK: u64 = TUPLES_PER_LOGICAL_BLOCK - 1;
const BLOCK_ROW_BITS: u32 = ROW_NUMBER_BITS - OFFSET_BITS;

/// Address of one row: `(segment, row number)` packed into 64 bits.
///
/// # Bit Layout
///
/// ```text
/// |--------- 64 bits total ---------|
/// | segno   |      row_number       |
/// | 16 bits |        48 bits        |
/// ```
///
/// Ordering compares the segment first, then the row number, which is the order a
/// sequential scan produces rows in.
#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u64)]
pub struct RowLocator {
    /// Row number inside the segment (48 bits).
    pub row_number: B48,
    /// Segment file the row lives in (16 bits).
    pub segno: B16,
}

impl RowLocator {
    /// Build a locator from its parts.
    ///
    /// Row numbers above [`MAX_ROW_NUMBER`] are truncated to 48 bits; callers allocating rows
    /// check the bound before a locator is ever formed.
    #[inline]
    pub fn from_parts(segno: SegmentNo, row_number: RowNumber) -> Self {
        debug_assert!(row_number <= MAX_ROW_NUMBER, "row number exceeds 48 bits");
        RowLocator::new()
            .with_segno(segno)
            .with_row_number(row_number & MAX_ROW_NUMBER)
    }

    /// Logical block holding this row.
    ///
    /// The segment number occupies the high bits so blocks of different segments never
    /// collide.
    #[inline]
    pub fn logical_block(&self) -> LogicalBlock {
        (u64::from(self.segno()) << BLOCK_ROW_BITS) | (self.row_number() >> OFFSET_BITS)
    }

    /// One-based offset of this row inside its logical block, in `1..=32768`.
    #[inline]
    pub fn block_offset(&self) -> u16 {
        // 32768 fits in u16
        ((self.row_number() & OFFSET_MASK) + 1) as u16
    }

    /// Inverse of [`logical_block`](Self::logical_block) / [`block_offset`](Self::block_offset).
    ///
    /// Returns `None` for offset `0` or offsets past the block.
    #[inline]
    pub fn from_block_offset(block: LogicalBlock, offset: u16) -> Option<Self> {
        if offset == 0 || u64::from(offset) > TUPLES_PER_LOGICAL_BLOCK {
            return None;
        }
        let row = block_first_row(block) + u64::from(offset) - 1;
        Some(Self::from_parts(block_segno(block), row))
    }
}

impl PartialOrd for RowLocator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RowLocator {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segno()
            .cmp(&other.segno())
            .then_with(|| self.row_number().cmp(&other.row_number()))
    }
}

impl fmt::Display for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.segno(), self.row_number())
    }
}

/// Segment a logical block belongs to.
#[inline]
pub fn block_segno(block: LogicalBlock) -> SegmentNo {
    (block >> BLOCK_ROW_BITS) as SegmentNo
}

/// First row number covered by a logical block.
#[inline]
pub fn block_first_row(block: LogicalBlock) -> RowNumber {
    (block & ((1 << BLOCK_ROW_BITS) - 1)) << OFFSET_BITS
}

/// Logical block holding row `0` of `segno`.
#[inline]
pub fn segment_first_block(segno: SegmentNo) -> LogicalBlock {
    u64::from(segno) << BLOCK_ROW_BITS
}

/// Number of logical blocks needed to cover `rows` rows.
#[inline]
pub fn logical_blocks_for_rows(rows: u64) -> u64 {
    rows.div_ceil(TUPLES_PER_LOGICAL_BLOCK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_block_mapping_matches_layout() {
        let loc = RowLocator::from_parts(1, 32_768);
        assert_eq!(loc.block_offset(), 1);
        assert_eq!(loc.logical_block(), (1u64 << 33) | 1);

        let last = RowLocator::from_parts(3, 32_767);
        assert_eq!(last.block_offset(), 32_768);
        assert_eq!(block_segno(last.logical_block()), 3);
        assert_eq!(block_first_row(last.logical_block()), 0);
    }

    #[test]
    fn block_offset_inverse() {
        let loc = RowLocator::from_parts(7, 1_000_123);
        let back = RowLocator::from_block_offset(loc.logical_block(), loc.block_offset());
        assert_eq!(back, Some(loc));
        assert_eq!(RowLocator::from_block_offset(loc.logical_block(), 0), None);
    }

    #[test]
    fn ordering_is_segment_then_row() {
        let a = RowLocator::from_parts(1, 900);
        let b = RowLocator::from_parts(2, 3);
        let c = RowLocator::from_parts(2, 4);
        let mut v = vec![c, a, b];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }

    #[test]
    fn max_row_number_round_trips() {
        let loc = RowLocator::from_parts(u16::MAX, MAX_ROW_NUMBER);
        assert_eq!(loc.row_number(), MAX_ROW_NUMBER);
        assert_eq!(loc.segno(), u16::MAX);
        assert_eq!(u64::from(loc), u64::MAX);
    }

    #[test]
    fn blocks_for_rows_rounds_up() {
        assert_eq!(logical_blocks_for_rows(0), 0);
        assert_eq!(logical_blocks_for_rows(1), 1);
        assert_eq!(logical_blocks_for_rows(32_768), 1);
        assert_eq!(logical_blocks_for_rows(32_769), 2);
        assert_eq!(segment_first_block(2), 2u64 << 33);
    }
}
