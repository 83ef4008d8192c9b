use aocs_result::{Error, Result};
use aocs_types::{ColumnIndex, ColumnType, Datum, RowNumber};

use crate::block_codec::{EncodedBlock, encode_block};

/// A block closed by a [`ColumnWriter`], ready to be persisted.
#[derive(Debug, Clone)]
pub struct FinishedBlock {
    pub first_row: RowNumber,
    pub encoded: EncodedBlock,
}

/// Buffers the values of one column until a block is full.
///
/// A block closes when it reaches the row limit or the byte limit, whichever comes first,
/// so columns with wide values cut blocks more often than narrow ones.
#[derive(Debug)]
pub struct ColumnWriter {
    column: ColumnIndex,
    ty: ColumnType,
    pending: Vec<Datum>,
    pending_bytes: usize,
    block_first_row: RowNumber,
    row_limit: usize,
    byte_limit: usize,
}

impl ColumnWriter {
    pub fn new(
        column: ColumnIndex,
        ty: ColumnType,
        first_row: RowNumber,
        row_limit: usize,
        byte_limit: usize,
    ) -> Self {
        Self {
            column,
            ty,
            pending: Vec::with_capacity(row_limit.min(1024)),
            pending_bytes: 0,
            block_first_row: first_row,
            row_limit: row_limit.max(1),
            byte_limit: byte_limit.max(1),
        }
    }

    pub fn column(&self) -> ColumnIndex {
        self.column
    }

    /// Row number the open block starts at.
    pub fn block_first_row(&self) -> RowNumber {
        self.block_first_row
    }

    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    /// Whether `row` cannot extend the open block because it skips a row number.
    pub fn breaks_contiguity(&self, row: RowNumber) -> bool {
        !self.pending.is_empty() && row != self.block_first_row + self.pending.len() as u64
    }

    pub fn push(&mut self, row: RowNumber, value: Datum) -> Result<()> {
        if !value.fits(self.ty) {
            return Err(Error::InvalidArgumentError(format!(
                "column {} expects {:?}, got {value:?}",
                self.column, self.ty
            )));
        }
        if self.breaks_contiguity(row) {
            return Err(Error::Internal(format!(
                "row {row} does not continue the open block of column {}",
                self.column
            )));
        }
        if self.pending.is_empty() {
            self.block_first_row = row;
        }
        self.pending_bytes += value.encoded_width();
        self.pending.push(value);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.row_limit || self.pending_bytes >= self.byte_limit
    }

    /// Close the open block. Returns `None` when nothing is buffered.
    pub fn take_block(&mut self) -> Result<Option<FinishedBlock>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let encoded = encode_block(self.ty, &self.pending)?;
        let first_row = self.block_first_row;
        self.block_first_row += self.pending.len() as u64;
        self.pending.clear();
        self.pending_bytes = 0;
        Ok(Some(FinishedBlock { first_row, encoded }))
    }
}
