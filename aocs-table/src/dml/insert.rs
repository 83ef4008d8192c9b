use std::ops::Range;

use aocs_directory::BlockDirectoryWriter;
use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_storage::segment::ColumnWriter;
use aocs_transaction::{RowVersion, WriteStamp};
use aocs_types::{ColumnDef, ColumnIndex, Datum, RowLocator, RowNumber, SegmentNo};

use crate::table::AocsTable;

/// Append state of one statement: a locked segment, one writer per column and the row
/// numbers reserved so far.
///
/// Dropping the descriptor without [`finish`](Self::finish) releases the segment lock and
/// finalizes any directory placeholder; blocks already flushed stay behind, invisible once
/// the writing transaction aborts.
pub struct InsertDesc<P: Pager> {
    table: AocsTable<P>,
    columns: Vec<ColumnDef>,
    stamp: WriteStamp,
    segno: SegmentNo,
    writers: Vec<ColumnWriter>,
    reserved: Range<RowNumber>,
    chunk: u64,
    directory: Option<BlockDirectoryWriter>,
    inserted: u64,
    released: bool,
}

impl<P: Pager> std::fmt::Debug for InsertDesc<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertDesc")
            .field("table", &self.table.id())
            .field("segno", &self.segno)
            .field("reserved", &self.reserved)
            .field("inserted", &self.inserted)
            .finish_non_exhaustive()
    }
}

impl<P: Pager> InsertDesc<P> {
    /// Lock a segment for writing and reserve the first batch of row numbers.
    ///
    /// `row_count_hint` sizes the reservation; a bulk load that knows its row count up front
    /// gets a single allocation.
    pub(crate) fn open(table: &AocsTable<P>, stamp: WriteStamp, row_count_hint: u64) -> Result<Self> {
        let config = table.config().clone();
        let columns = table.columns();
        let segno = table.catalog_mut().choose_segno_for_write()?;
        let mut desc = Self {
            table: table.clone(),
            columns,
            stamp,
            segno,
            writers: Vec::new(),
            reserved: 0..0,
            chunk: row_count_hint.max(config.fast_sequence_chunk).max(1),
            directory: None,
            inserted: 0,
            released: false,
        };
        desc.reserve()?;
        let first_row = desc.reserved.start;
        desc.writers = desc
            .columns
            .iter()
            .enumerate()
            .map(|(col, def)| {
                ColumnWriter::new(
                    col,
                    def.ty,
                    first_row,
                    config.block_row_limit,
                    config.block_byte_limit,
                )
            })
            .collect();

        if table.has_block_directory() {
            let mut writer = table.block_directory().writer(segno, stamp);
            if table.has_unique_index() {
                let column = table.first_non_dropped_column()?;
                let file_offset = table.catalog().segment(segno)?.column_file(column)?.eof();
                writer.insert_placeholder(column, first_row, file_offset)?;
            }
            desc.directory = Some(writer);
        }
        tracing::debug!(
            "[AOCS] table {} insert desc on seg {segno} (txn {}/{}, first row {first_row})",
            table.id(),
            stamp.txn_id,
            stamp.command_id
        );
        Ok(desc)
    }

    pub fn segno(&self) -> SegmentNo {
        self.segno
    }

    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Reservations made on the segment's fast sequence over its lifetime.
    pub fn sequence_allocations(&self) -> Result<u64> {
        Ok(self
            .table
            .catalog()
            .segment(self.segno)?
            .fast_sequence()
            .allocations())
    }

    /// Make sure at least `rows` row numbers are reserved.
    pub(crate) fn ensure_reserved(&mut self, rows: u64) -> Result<()> {
        let available = self.reserved.end - self.reserved.start;
        if available < rows {
            self.chunk = self.chunk.max(rows - available);
            if available == 0 {
                self.reserve()?;
            }
        }
        Ok(())
    }

    fn reserve(&mut self) -> Result<()> {
        self.reserved = self
            .table
            .catalog_mut()
            .segment_mut(self.segno)?
            .reserve_rows(self.chunk)?;
        Ok(())
    }

    fn validate(&self, values: &[Datum]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidArgumentError(format!(
                "row has {} values, table {} has {} columns",
                values.len(),
                self.table.id(),
                self.columns.len()
            )));
        }
        for (col, (def, value)) in self.columns.iter().zip(values).enumerate() {
            if !def.dropped && !value.fits(def.ty) {
                return Err(Error::InvalidArgumentError(format!(
                    "column {col} ({}) expects {:?}, got {value:?}",
                    def.name, def.ty
                )));
            }
        }
        Ok(())
    }

    /// Append one row and return its locator.
    pub fn insert_row(&mut self, values: Vec<Datum>) -> Result<RowLocator> {
        self.validate(&values)?;
        if self.reserved.is_empty() {
            self.reserve()?;
        }
        let row = self.reserved.start;
        self.reserved.start += 1;

        for (col, value) in values.into_iter().enumerate() {
            let value = if self.columns[col].dropped {
                Datum::Null
            } else {
                value
            };
            if self.writers[col].breaks_contiguity(row) {
                self.flush_column(col)?;
            }
            self.writers[col].push(row, value)?;
            if self.writers[col].is_full() {
                self.flush_column(col)?;
            }
        }
        self.inserted += 1;
        Ok(RowLocator::from_parts(self.segno, row))
    }

    fn flush_column(&mut self, col: ColumnIndex) -> Result<()> {
        let Some(block) = self.writers[col].take_block()? else {
            return Ok(());
        };
        let header = self.table.catalog_mut().persist_block(
            self.table.pager().as_ref(),
            self.segno,
            col,
            block,
            RowVersion::created(self.stamp),
        )?;
        if let Some(directory) = self.directory.as_mut() {
            directory.insert_entry(col, header.first_row, header.file_offset, header.row_count)?;
        }
        Ok(())
    }

    /// Flush every column, finalize directory entries and release the segment.
    pub fn finish(mut self) -> Result<u64> {
        for col in 0..self.writers.len() {
            self.flush_column(col)?;
        }
        if let Some(directory) = self.directory.take() {
            directory.finish()?;
        }
        self.table.catalog_mut().segment_mut(self.segno)?.bump_modcount();
        self.table.bump_modcount();
        self.table.release_segment(self.segno);
        self.released = true;
        tracing::debug!(
            "[AOCS] table {} insert on seg {} finished: {} rows",
            self.table.id(),
            self.segno,
            self.inserted
        );
        Ok(self.inserted)
    }
}

impl<P: Pager> Drop for InsertDesc<P> {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(
                "[AOCS] table {} insert desc on seg {} dropped unfinished",
                self.table.id(),
                self.segno
            );
            self.table.release_segment(self.segno);
        }
    }
}
