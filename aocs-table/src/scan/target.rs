use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_transaction::ReadView;
use aocs_types::{ColumnIndex, RowLocator, RowNumber, SegmentNo, TupleSlot};

use super::FetchDesc;
use crate::table::AocsTable;

/// Outcome of looking up one flat tuple index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TargetTuple {
    Live(TupleSlot),
    /// The row exists but is deleted for the view.
    Dead,
    /// The index lies past the rows captured when the map was built.
    Missing,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    flat_start: u64,
    segno: SegmentNo,
    first_row: RowNumber,
}

/// Maps a flat index over every physically present tuple, `0..total_tuples`, to a locator.
///
/// Tuples are numbered segment by segment in segment-number order, then in row order, using
/// the blocks of column 0 that the metadata view can see. Deleted rows keep their index.
pub(crate) struct TargetTupleMap<P: Pager> {
    runs: Vec<Run>,
    total: u64,
    fetch: FetchDesc<P>,
    view: ReadView,
    table: AocsTable<P>,
}

impl<P: Pager> TargetTupleMap<P> {
    pub(crate) fn build(table: &AocsTable<P>, view: &ReadView, projection: Vec<ColumnIndex>) -> Result<Self> {
        let meta_view = table.metadata_view(view);
        let mut runs = Vec::new();
        let mut total = 0u64;
        {
            let catalog = table.catalog();
            for segment in catalog.readable_segments() {
                let Some(file) = segment.column(0) else {
                    continue;
                };
                for block in file.visible_blocks(&meta_view, table.txn_manager()) {
                    runs.push(Run {
                        flat_start: total,
                        segno: segment.segno(),
                        first_row: block.first_row,
                    });
                    total += block.row_count;
                }
            }
        }
        tracing::debug!(
            "[AOCS] table {}: target tuple map over {total} tuples in {} runs",
            table.id(),
            runs.len()
        );
        Ok(Self {
            runs,
            total,
            fetch: FetchDesc::open(table, view, projection),
            view: view.clone(),
            table: table.clone(),
        })
    }

    /// Number of physically present tuples, deleted ones included.
    pub(crate) fn total_tuples(&self) -> u64 {
        self.total
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.fetch.bytes_read()
    }

    pub(crate) fn locate(&self, flat: u64) -> Option<RowLocator> {
        if flat >= self.total {
            return None;
        }
        let idx = self.runs.partition_point(|r| r.flat_start <= flat).checked_sub(1)?;
        let run = self.runs[idx];
        Some(RowLocator::from_parts(
            run.segno,
            run.first_row + (flat - run.flat_start),
        ))
    }

    /// Fetch the tuple with flat index `flat`.
    pub(crate) fn get_target_tuple(&mut self, flat: u64) -> Result<TargetTuple> {
        let Some(locator) = self.locate(flat) else {
            return Ok(TargetTuple::Missing);
        };
        if !self.table.visibility_map().is_visible(&self.view, locator) {
            tracing::trace!("[AOCS] target tuple {flat} at {locator}: dead");
            return Ok(TargetTuple::Dead);
        }
        Ok(match self.fetch.fetch(locator)? {
            Some(slot) => TargetTuple::Live(slot),
            None => TargetTuple::Missing,
        })
    }
}
