use std::sync::Arc;

use aocs_result::{Error, Result};
use aocs_transaction::{ReadView, TxnIdManager};
use aocs_types::{ColumnIndex, ColumnType, Datum, RowNumber};

use super::{BlockHeader, SegmentFile};
use crate::block_codec::decode_block;
use crate::pager::{Pager, get_one};

struct LoadedBlock {
    index: usize,
    header: BlockHeader,
    values: Vec<Datum>,
}

/// Reads one column of one segment, either as a forward stream or by row number.
///
/// The reader captures the blocks visible under the view it was opened with; blocks
/// appended afterwards are not picked up.
pub struct ColumnReader<P: Pager> {
    pager: Arc<P>,
    column: ColumnIndex,
    ty: ColumnType,
    blocks: Vec<BlockHeader>,
    missing_below: RowNumber,
    missing_value: Datum,
    next_block: usize,
    current: Option<LoadedBlock>,
    pos: usize,
    bytes_read: u64,
    newly_loaded: Option<BlockHeader>,
}

impl<P: Pager> ColumnReader<P> {
    pub fn open(
        pager: Arc<P>,
        segment: &SegmentFile,
        column: ColumnIndex,
        ty: ColumnType,
        missing_value: Datum,
        view: &ReadView,
        manager: &TxnIdManager,
    ) -> Result<Self> {
        let file = segment.column_file(column)?;
        Ok(Self {
            pager,
            column,
            ty,
            blocks: file.visible_blocks(view, manager),
            missing_below: file.missing_below(),
            missing_value,
            next_block: 0,
            current: None,
            pos: 0,
            bytes_read: 0,
            newly_loaded: None,
        })
    }

    pub fn column(&self) -> ColumnIndex {
        self.column
    }

    pub fn blocks(&self) -> &[BlockHeader] {
        &self.blocks
    }

    /// Whether some rows of the segment predate this column.
    pub fn has_missing_rows(&self) -> bool {
        self.missing_below > 0
    }

    /// Whether `row` predates the column, so its value is the missing value.
    #[inline]
    pub fn is_missing(&self, row: RowNumber) -> bool {
        row < self.missing_below
    }

    /// Total encoded bytes pulled from the pager so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Header of the block loaded since the previous call, if any.
    pub fn take_newly_loaded(&mut self) -> Option<BlockHeader> {
        self.newly_loaded.take()
    }

    pub fn rewind(&mut self) {
        self.next_block = 0;
        self.current = None;
        self.pos = 0;
        self.newly_loaded = None;
    }

    fn load(&mut self, index: usize) -> Result<()> {
        if self.current.as_ref().is_some_and(|c| c.index == index) {
            return Ok(());
        }
        let header = *self
            .blocks
            .get(index)
            .ok_or_else(|| Error::Internal(format!("block {index} out of range")))?;
        let blob = get_one(self.pager.as_ref(), header.key)?;
        let values = decode_block(self.ty, &blob)?;
        if values.len() as u64 != header.row_count {
            return Err(Error::Internal(format!(
                "block at offset {} of column {} holds {} values, header says {}",
                header.file_offset,
                self.column,
                values.len(),
                header.row_count
            )));
        }
        self.bytes_read += header.byte_len;
        self.newly_loaded = Some(header);
        self.current = Some(LoadedBlock {
            index,
            header,
            values,
        });
        Ok(())
    }

    /// Next `(row, value)` in row order, or `None` at the end of the column file.
    pub fn next(&mut self) -> Result<Option<(RowNumber, Datum)>> {
        loop {
            if let Some(cur) = &self.current
                && self.pos < cur.values.len()
            {
                let row = cur.header.first_row + self.pos as u64;
                let value = cur.values[self.pos].clone();
                self.pos += 1;
                return Ok(Some((row, value)));
            }
            if self.next_block >= self.blocks.len() {
                return Ok(None);
            }
            let index = self.next_block;
            self.next_block += 1;
            self.load(index)?;
            self.pos = 0;
        }
    }

    /// Position the stream inside the block stored at `file_offset` so that the next call to
    /// [`next`](Self::next) yields the value at `row_in_block` (zero-based).
    ///
    /// Returns `false` if no visible block starts at that offset.
    pub fn position(&mut self, file_offset: u64, row_in_block: u64) -> Result<bool> {
        let Ok(index) = self
            .blocks
            .binary_search_by_key(&file_offset, |b| b.file_offset)
        else {
            return Ok(false);
        };
        self.load(index)?;
        self.next_block = index + 1;
        self.pos = usize::try_from(row_in_block)
            .map_err(|_| Error::Internal("row offset overflows usize".into()))?;
        Ok(true)
    }

    /// Value of `row`, or `None` if the column file holds no visible value for it.
    ///
    /// `offset_hint` is the file offset of the block expected to cover the row, as recorded
    /// by the block directory.
    pub fn fetch(&mut self, row: RowNumber, offset_hint: Option<u64>) -> Result<Option<Datum>> {
        if row < self.missing_below {
            return Ok(Some(self.missing_value.clone()));
        }
        if let Some(cur) = &self.current
            && cur.header.covers(row)
        {
            return Ok(Some(cur.values[(row - cur.header.first_row) as usize].clone()));
        }

        let index = match offset_hint {
            Some(offset) => self
                .blocks
                .binary_search_by_key(&offset, |b| b.file_offset)
                .ok(),
            None => self
                .blocks
                .partition_point(|b| b.first_row <= row)
                .checked_sub(1),
        };
        let Some(index) = index.filter(|&i| self.blocks[i].covers(row)) else {
            return Ok(None);
        };
        self.load(index)?;
        let cur = self
            .current
            .as_ref()
            .ok_or_else(|| Error::Internal("block vanished after load".into()))?;
        Ok(Some(cur.values[(row - cur.header.first_row) as usize].clone()))
    }
}
