use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_storage::segment::SegmentState;
use aocs_transaction::ReadView;
use aocs_types::ids::{block_first_row, block_segno};
use aocs_types::{
    ColumnDef, ColumnIndex, LogicalBlock, MAX_ROW_NUMBER, RowLocator, RowNumber, SegmentNo,
    TUPLES_PER_LOGICAL_BLOCK, TupleSlot,
};

use super::{PartialScanStart, Projection, ScanState, SegmentCursor, TableScan};
use crate::interrupt::Interrupt;
use crate::table::AocsTable;

#[derive(Debug, Clone, Copy)]
struct RowRange {
    segno: SegmentNo,
    start_row: RowNumber,
    end_row: RowNumber,
}

/// Scan for index builds: every stored row, deleted or not, each reported with whether it
/// is still alive.
///
/// Restricted to `[start_block, start_block + num_blocks)` it reads one segment and uses
/// the block directory to start near the first requested row instead of at the start of
/// the segment.
pub struct RangeScan<P: Pager> {
    table: AocsTable<P>,
    meta_view: ReadView,
    columns: Vec<ColumnDef>,
    projection: Vec<ColumnIndex>,
    range: Option<RowRange>,
    /// Positioning is skipped when this scan had to build the directory itself.
    use_directory: bool,
    segnos: Vec<SegmentNo>,
    next_segment: usize,
    cursor: Option<SegmentCursor<P>>,
    partial_start: Option<PartialScanStart>,
    bytes_from_closed: u64,
    state: ScanState,
    interrupt: Interrupt,
}

impl<P: Pager> RangeScan<P> {
    pub fn begin(
        table: &AocsTable<P>,
        projection: &Projection,
        start_block: Option<LogicalBlock>,
        num_blocks: Option<u64>,
        interrupt: Interrupt,
    ) -> Result<Self> {
        let columns = table.columns();
        let projection = projection.resolve(&columns)?;
        let built = table.ensure_block_directory()?;
        let range = match (start_block, num_blocks) {
            (_, None) => None,
            (Some(start), Some(n)) => {
                let start_row = block_first_row(start);
                let end_row = n
                    .checked_mul(TUPLES_PER_LOGICAL_BLOCK)
                    .and_then(|len| start_row.checked_add(len))
                    .map_or(MAX_ROW_NUMBER + 1, |end| end.min(MAX_ROW_NUMBER + 1));
                Some(RowRange {
                    segno: block_segno(start),
                    start_row,
                    end_row,
                })
            }
            (None, Some(_)) => {
                return Err(Error::InvalidArgumentError(
                    "a block count needs a start block".into(),
                ));
            }
        };
        let segnos = match range {
            Some(r) => vec![r.segno],
            None => table
                .catalog()
                .readable_segments()
                .map(|s| s.segno())
                .collect(),
        };
        tracing::debug!(
            "[AOCS] table {} range scan open: blocks {start_block:?}+{num_blocks:?}, {} segments, directory built here: {built}",
            table.id(),
            segnos.len()
        );
        Ok(Self {
            meta_view: ReadView::Mvcc(table.txn_manager().latest_snapshot()),
            table: table.clone(),
            columns,
            projection,
            range,
            use_directory: !built,
            segnos,
            next_segment: 0,
            cursor: None,
            partial_start: None,
            bytes_from_closed: 0,
            state: ScanState::Open,
            interrupt,
        })
    }

    /// How the bounded segment was entered, once it has been opened.
    pub fn partial_start(&self) -> Option<PartialScanStart> {
        self.partial_start
    }

    fn close_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.bytes_from_closed += cursor.bytes_read();
        }
    }

    fn open_next_segment(&mut self) -> Result<bool> {
        while let Some(&segno) = self.segnos.get(self.next_segment) {
            self.next_segment += 1;
            let catalog = self.table.catalog();
            let Ok(segment) = catalog.segment(segno) else {
                tracing::trace!("[AOCS] range scan: seg {segno} does not exist");
                continue;
            };
            if segment.state() != SegmentState::Default {
                tracing::trace!("[AOCS] range scan: seg {segno} awaits drop");
                continue;
            }
            let mut cursor = SegmentCursor::open(
                &self.table,
                segment,
                &self.columns,
                &self.projection,
                &ReadView::Any,
                &self.meta_view,
            )?;
            drop(catalog);

            if let Some(range) = self.range
                && self.use_directory
            {
                let start = cursor.position_for_partial_scan(
                    self.table.block_directory(),
                    &self.meta_view,
                    range.start_row,
                    &self.interrupt,
                )?;
                tracing::debug!(
                    "[AOCS] range scan seg {segno} from row {}: {start:?}",
                    range.start_row
                );
                self.partial_start = Some(start);
                if start == PartialScanStart::Empty {
                    self.bytes_from_closed += cursor.bytes_read();
                    continue;
                }
            }
            self.cursor = Some(cursor);
            return Ok(true);
        }
        Ok(false)
    }

    /// Next row and whether it is alive for the latest snapshot.
    pub fn next_with_liveness(&mut self) -> Result<Option<(TupleSlot, bool)>> {
        if self.state != ScanState::Open {
            return Ok(None);
        }
        loop {
            self.interrupt.check()?;
            let Some(cursor) = self.cursor.as_mut() else {
                if !self.open_next_segment()? {
                    self.state = ScanState::Exhausted;
                    return Ok(None);
                }
                continue;
            };
            let Some((locator, values)) = cursor.next_row()? else {
                self.close_cursor();
                continue;
            };
            if let Some(range) = self.range {
                let row = locator.row_number();
                if row < range.start_row {
                    continue;
                }
                if row >= range.end_row {
                    self.close_cursor();
                    self.state = ScanState::Exhausted;
                    return Ok(None);
                }
            }
            let alive = self
                .table
                .visibility_map()
                .is_visible(&self.meta_view, locator);
            return Ok(Some((TupleSlot::new(locator, values), alive)));
        }
    }

    /// First locator the range may contain, if the scan is bounded.
    pub fn start_locator(&self) -> Option<RowLocator> {
        self.range
            .map(|r| RowLocator::from_parts(r.segno, r.start_row))
    }
}

impl<P: Pager> TableScan for RangeScan<P> {
    fn next(&mut self) -> Result<Option<TupleSlot>> {
        Ok(self.next_with_liveness()?.map(|(slot, _)| slot))
    }

    fn rescan(&mut self) -> Result<()> {
        self.close_cursor();
        self.next_segment = 0;
        self.partial_start = None;
        if self.state != ScanState::Closed {
            self.state = ScanState::Open;
        }
        Ok(())
    }

    fn end(&mut self) {
        self.close_cursor();
        self.state = ScanState::Closed;
    }

    fn state(&self) -> ScanState {
        self.state
    }

    fn total_bytes_read(&self) -> u64 {
        self.bytes_from_closed + self.cursor.as_ref().map_or(0, SegmentCursor::bytes_read)
    }
}
