use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_storage::segment::{ColumnReader, SegmentState};
use aocs_transaction::ReadView;
use aocs_types::{ColumnDef, ColumnIndex, Datum, RowLocator, SegmentNo, TupleSlot};
use rustc_hash::FxHashMap;

use crate::table::AocsTable;

/// Random access by locator, shared by index fetches, bitmap scans and sampling.
///
/// Column readers are opened per segment on first touch and kept until the descriptor is
/// dropped; a reader caches the block it decoded last, so lookups clustered by locator
/// decode each block once.
pub(crate) struct FetchDesc<P: Pager> {
    table: AocsTable<P>,
    view: ReadView,
    meta_view: ReadView,
    columns: Vec<ColumnDef>,
    projection: Vec<ColumnIndex>,
    /// `None` marks a segment that cannot be read (gone or awaiting drop).
    segments: FxHashMap<SegmentNo, Option<Vec<ColumnReader<P>>>>,
    use_directory: bool,
}

impl<P: Pager> FetchDesc<P> {
    pub(crate) fn open(table: &AocsTable<P>, view: &ReadView, projection: Vec<ColumnIndex>) -> Self {
        let use_directory = table.has_block_directory();
        tracing::debug!(
            "[AOCS] table {} fetch desc over columns {projection:?} (directory: {use_directory})",
            table.id()
        );
        Self {
            table: table.clone(),
            view: view.clone(),
            meta_view: table.metadata_view(view),
            columns: table.columns(),
            projection,
            segments: FxHashMap::default(),
            use_directory,
        }
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.segments
            .values()
            .flatten()
            .flat_map(|readers| readers.iter().map(ColumnReader::bytes_read))
            .sum()
    }

    fn readers(&mut self, segno: SegmentNo) -> Result<Option<&mut Vec<ColumnReader<P>>>> {
        if !self.segments.contains_key(&segno) {
            let catalog = self.table.catalog();
            let readers = match catalog.segment(segno) {
                Ok(segment) if segment.state() == SegmentState::Default => {
                    let mut readers = Vec::with_capacity(self.projection.len());
                    for &col in &self.projection {
                        let def = &self.columns[col];
                        readers.push(ColumnReader::open(
                            self.table.pager().clone(),
                            segment,
                            col,
                            def.ty,
                            def.missing_value.clone(),
                            &self.meta_view,
                            self.table.txn_manager(),
                        )?);
                    }
                    Some(readers)
                }
                _ => None,
            };
            self.segments.insert(segno, readers);
        }
        Ok(self.segments.get_mut(&segno).and_then(Option::as_mut))
    }

    /// Row at `locator`, or `None` if it does not exist or is hidden from the view.
    pub(crate) fn fetch(&mut self, locator: RowLocator) -> Result<Option<TupleSlot>> {
        if !self.table.visibility_map().is_visible(&self.view, locator) {
            tracing::trace!("[AOCS] fetch {locator}: deleted");
            return Ok(None);
        }
        let row = locator.row_number();
        let num_columns = self.columns.len();
        let use_directory = self.use_directory;
        let directory = self.table.block_directory().clone();
        let meta_view = self.meta_view.clone();
        let Some(readers) = self.readers(locator.segno())? else {
            return Ok(None);
        };

        let mut values = vec![Datum::Null; num_columns];
        for reader in readers.iter_mut() {
            let hint = if use_directory && !reader.is_missing(row) {
                match directory.get_entry(&meta_view, locator, reader.column()) {
                    Some(entry) => Some(entry.file_offset),
                    None => {
                        tracing::trace!(
                            "[AOCS] fetch {locator}: no directory entry for col {}",
                            reader.column()
                        );
                        return Ok(None);
                    }
                }
            } else {
                None
            };
            let Some(value) = reader.fetch(row, hint)? else {
                tracing::trace!("[AOCS] fetch {locator}: col {} has no value", reader.column());
                return Ok(None);
            };
            values[reader.column()] = value;
        }
        Ok(Some(TupleSlot::new(locator, values)))
    }
}
