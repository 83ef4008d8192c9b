use aocs_directory::{BlockDirectory, DirectoryEntry};
use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_storage::segment::{ColumnReader, SegmentFile};
use aocs_transaction::ReadView;
use aocs_types::{ColumnDef, ColumnIndex, Datum, RowLocator, RowNumber, SegmentNo};
use roaring::RoaringTreemap;

use crate::interrupt::Interrupt;
use crate::table::AocsTable;

/// A column read in step with the driving column.
struct Follower<P: Pager> {
    reader: ColumnReader<P>,
    lookahead: Option<(RowNumber, Datum)>,
}

impl<P: Pager> Follower<P> {
    /// Value of `row`, skipping rows the driver did not stop at.
    fn advance_to(&mut self, row: RowNumber) -> Result<Datum> {
        if self.reader.is_missing(row) {
            return self.reader.fetch(row, None)?.ok_or_else(|| {
                Error::Internal(format!("column {} lost its missing value", self.reader.column()))
            });
        }
        loop {
            let (next_row, value) = match self.lookahead.take() {
                Some(pair) => pair,
                None => self.reader.next()?.ok_or_else(|| {
                    Error::Internal(format!(
                        "column {} ended before row {row}",
                        self.reader.column()
                    ))
                })?,
            };
            if next_row < row {
                continue;
            }
            if next_row == row {
                return Ok(value);
            }
            self.lookahead = Some((next_row, value));
            return Err(Error::Internal(format!(
                "column {} has no value for row {row} (next is {next_row})",
                self.reader.column()
            )));
        }
    }
}

/// Where a partial scan of a segment starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialScanStart {
    /// Every column was positioned at this common row.
    Positioned(RowNumber),
    /// The directory had nothing at or before the start row; read from the segment start.
    SegmentStart,
    /// A directory entry named a block the column file does not have; nothing to read.
    Empty,
}

/// Streams the rows of one segment.
///
/// One column drives the stream: the first projected column whose file holds every row of
/// the segment, or column 0 when every projected column was added after rows existed.
/// The other projected columns follow it row by row.
pub(crate) struct SegmentCursor<P: Pager> {
    segno: SegmentNo,
    num_columns: usize,
    driver: ColumnReader<P>,
    driver_projected: bool,
    followers: Vec<Follower<P>>,
    hidden: RoaringTreemap,
}

impl<P: Pager> SegmentCursor<P> {
    /// Open readers for `projection`. Blocks are filtered by `meta_view`, deleted rows by
    /// `view`.
    pub(crate) fn open(
        table: &AocsTable<P>,
        segment: &SegmentFile,
        columns: &[ColumnDef],
        projection: &[ColumnIndex],
        view: &ReadView,
        meta_view: &ReadView,
    ) -> Result<Self> {
        let segno = segment.segno();
        let open_reader = |col: ColumnIndex| -> Result<ColumnReader<P>> {
            let def = columns.get(col).ok_or_else(|| {
                Error::InvalidArgumentError(format!("column {col} does not exist"))
            })?;
            ColumnReader::open(
                table.pager().clone(),
                segment,
                col,
                def.ty,
                def.missing_value.clone(),
                meta_view,
                table.txn_manager(),
            )
        };

        let driver_col = projection
            .iter()
            .copied()
            .find(|&c| segment.column(c).is_some_and(|f| f.missing_below() == 0))
            .unwrap_or(0);
        let driver = open_reader(driver_col)?;
        let followers = projection
            .iter()
            .copied()
            .filter(|&c| c != driver_col)
            .map(|c| {
                Ok(Follower {
                    reader: open_reader(c)?,
                    lookahead: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let hidden = table.visibility_map().hidden_rows(view, segno);
        tracing::trace!(
            "[AOCS] seg {segno} cursor: driver col {driver_col}, {} followers, {} hidden",
            followers.len(),
            hidden.len()
        );
        Ok(Self {
            segno,
            num_columns: columns.len(),
            driver,
            driver_projected: projection.contains(&driver_col),
            followers,
            hidden,
        })
    }

    pub(crate) fn segno(&self) -> SegmentNo {
        self.segno
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.driver.bytes_read() + self.followers.iter().map(|f| f.reader.bytes_read()).sum::<u64>()
    }

    /// Next row not hidden from the view, with non-projected columns left `Null`.
    pub(crate) fn next_row(&mut self) -> Result<Option<(RowLocator, Vec<Datum>)>> {
        loop {
            let Some((row, value)) = self.driver.next()? else {
                return Ok(None);
            };
            if self.hidden.contains(row) {
                continue;
            }
            let mut values = vec![Datum::Null; self.num_columns];
            if self.driver_projected {
                values[self.driver.column()] = value;
            }
            for follower in &mut self.followers {
                let col = follower.reader.column();
                values[col] = follower.advance_to(row)?;
            }
            return Ok(Some((RowLocator::from_parts(self.segno, row), values)));
        }
    }

    /// Position every column near `start_row` using the block directory.
    ///
    /// Phase 1 looks up, per column, the directory entry a scan starting at `start_row`
    /// should begin with; columns whose file starts after `start_row` are skipped. Phase 2
    /// moves every located column to the greatest first row among those entries, so all
    /// columns start on the same row.
    pub(crate) fn position_for_partial_scan(
        &mut self,
        directory: &BlockDirectory,
        meta_view: &ReadView,
        start_row: RowNumber,
        interrupt: &Interrupt,
    ) -> Result<PartialScanStart> {
        let segno = self.segno;
        let mut located: Vec<(usize, DirectoryEntry)> = Vec::new();
        let readers = std::iter::once(&self.driver).chain(self.followers.iter().map(|f| &f.reader));
        for (slot, reader) in readers.enumerate() {
            interrupt.check()?;
            if reader.is_missing(start_row) {
                tracing::trace!(
                    "[AOCS] seg {segno} col {}: row {start_row} predates the column",
                    reader.column()
                );
                continue;
            }
            match directory.get_entry_for_partial_scan(meta_view, segno, reader.column(), start_row) {
                Some(entry) => located.push((slot, entry)),
                None => {
                    tracing::trace!(
                        "[AOCS] seg {segno} col {}: no directory entry at or before row {start_row}",
                        reader.column()
                    );
                    return Ok(PartialScanStart::SegmentStart);
                }
            }
        }
        let Some(common) = located.iter().map(|(_, e)| e.first_row).max() else {
            return Ok(PartialScanStart::SegmentStart);
        };

        for (slot, entry) in located {
            interrupt.check()?;
            let reader = if slot == 0 {
                &mut self.driver
            } else {
                let follower = &mut self.followers[slot - 1];
                follower.lookahead = None;
                &mut follower.reader
            };
            let skip = common.saturating_sub(entry.first_row);
            if !reader.position(entry.file_offset, skip)? {
                tracing::debug!(
                    "[AOCS] seg {segno} col {}: no block at offset {}",
                    reader.column(),
                    entry.file_offset
                );
                return Ok(PartialScanStart::Empty);
            }
            tracing::trace!(
                "[AOCS] seg {segno} col {}: positioned at offset {} + {skip} rows",
                reader.column(),
                entry.file_offset
            );
        }
        Ok(PartialScanStart::Positioned(common))
    }
}
