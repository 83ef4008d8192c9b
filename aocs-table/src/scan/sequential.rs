use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_storage::segment::SegmentState;
use aocs_transaction::ReadView;
use aocs_types::{ColumnDef, ColumnIndex, SegmentNo, TupleSlot};

use super::{Projection, ScanState, SegmentCursor, TableScan};
use crate::interrupt::Interrupt;
use crate::table::AocsTable;

/// Every visible row of the table, in locator order.
///
/// The segment list is captured when the scan begins; segments created later are not
/// visited.
pub struct SeqScan<P: Pager> {
    table: AocsTable<P>,
    view: ReadView,
    meta_view: ReadView,
    columns: Vec<ColumnDef>,
    projection: Vec<ColumnIndex>,
    segnos: Vec<SegmentNo>,
    next_segment: usize,
    cursor: Option<SegmentCursor<P>>,
    bytes_from_closed: u64,
    state: ScanState,
    interrupt: Interrupt,
}

impl<P: Pager> SeqScan<P> {
    pub fn begin(
        table: &AocsTable<P>,
        view: ReadView,
        projection: &Projection,
        interrupt: Interrupt,
    ) -> Result<Self> {
        let columns = table.columns();
        let projection = projection.resolve(&columns)?;
        let segnos: Vec<SegmentNo> = table
            .catalog()
            .readable_segments()
            .map(|s| s.segno())
            .collect();
        tracing::debug!(
            "[AOCS] table {} seq scan open: {} segments, columns {projection:?}",
            table.id(),
            segnos.len()
        );
        Ok(Self {
            meta_view: table.metadata_view(&view),
            table: table.clone(),
            view,
            columns,
            projection,
            segnos,
            next_segment: 0,
            cursor: None,
            bytes_from_closed: 0,
            state: ScanState::Open,
            interrupt,
        })
    }

    pub fn projection(&self) -> &[ColumnIndex] {
        &self.projection
    }

    fn close_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.bytes_from_closed += cursor.bytes_read();
            tracing::trace!("[AOCS] seq scan left seg {}", cursor.segno());
        }
    }

    /// Open a cursor on the next segment that can still be read.
    fn open_next_segment(&mut self) -> Result<bool> {
        while let Some(&segno) = self.segnos.get(self.next_segment) {
            self.next_segment += 1;
            let catalog = self.table.catalog();
            let Ok(segment) = catalog.segment(segno) else {
                continue;
            };
            if segment.state() != SegmentState::Default {
                continue;
            }
            let cursor = SegmentCursor::open(
                &self.table,
                segment,
                &self.columns,
                &self.projection,
                &self.view,
                &self.meta_view,
            )?;
            drop(catalog);
            self.cursor = Some(cursor);
            return Ok(true);
        }
        Ok(false)
    }
}

impl<P: Pager> TableScan for SeqScan<P> {
    fn next(&mut self) -> Result<Option<TupleSlot>> {
        if self.state != ScanState::Open {
            return Ok(None);
        }
        loop {
            self.interrupt.check()?;
            if let Some(cursor) = self.cursor.as_mut() {
                if let Some((locator, values)) = cursor.next_row()? {
                    return Ok(Some(TupleSlot::new(locator, values)));
                }
                self.close_cursor();
            }
            if !self.open_next_segment()? {
                self.state = ScanState::Exhausted;
                return Ok(None);
            }
        }
    }

    fn rescan(&mut self) -> Result<()> {
        self.close_cursor();
        self.next_segment = 0;
        if self.state != ScanState::Closed {
            self.state = ScanState::Open;
        }
        Ok(())
    }

    fn end(&mut self) {
        self.close_cursor();
        if self.state != ScanState::Closed {
            tracing::debug!(
                "[AOCS] table {} seq scan closed after {} bytes",
                self.table.id(),
                self.bytes_from_closed
            );
        }
        self.state = ScanState::Closed;
    }

    fn state(&self) -> ScanState {
        self.state
    }

    fn total_bytes_read(&self) -> u64 {
        self.bytes_from_closed + self.cursor.as_ref().map_or(0, SegmentCursor::bytes_read)
    }
}
