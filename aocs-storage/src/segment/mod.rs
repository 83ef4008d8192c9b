//! Segment files.
//!
//! A table's rows are spread over numbered segment files. Inside a segment every column
//! has its own append-only file, modelled here as an ordered list of [`BlockHeader`]s whose
//! payloads live in the pager. Block boundaries are chosen per column, so the same row can
//! sit in differently numbered blocks of different columns.

mod catalog;
mod fast_sequence;
mod reader;
mod writer;

pub use catalog::{ColumnFile, SegmentCatalog, SegmentFile, SegmentState, SegmentTotals};
pub use fast_sequence::FastSequence;
pub use reader::ColumnReader;
pub use writer::{ColumnWriter, FinishedBlock};

use aocs_transaction::RowVersion;
use aocs_types::RowNumber;

use crate::types::PhysicalKey;

/// One stored block of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Row number of the first value in the block. Rows inside a block are contiguous.
    pub first_row: RowNumber,
    pub row_count: u64,
    /// Byte position of the block inside the column file.
    pub file_offset: u64,
    pub byte_len: u64,
    pub uncompressed_len: u64,
    pub key: PhysicalKey,
    /// Writer of the block; an aborted writer leaves an invisible block behind.
    pub version: RowVersion,
}

impl BlockHeader {
    #[inline]
    pub fn last_row(&self) -> RowNumber {
        self.first_row + self.row_count.saturating_sub(1)
    }

    #[inline]
    pub fn covers(&self, row: RowNumber) -> bool {
        row >= self.first_row && row < self.first_row + self.row_count
    }
}
