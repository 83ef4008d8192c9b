use std::collections::BTreeMap;
use std::ops::Range;

use aocs_result::{Error, Result};
use aocs_transaction::{ReadView, RowVersion, TxnIdManager};
use aocs_types::{ColumnIndex, RowNumber, SegmentNo};

use super::{BlockHeader, FastSequence, FinishedBlock};
use crate::pager::{BatchPut, Pager};
use crate::types::PhysicalKey;

/// Lifecycle state of a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Default,
    /// Compacted away; readers and writers skip it until it is cleared.
    AwaitingDrop,
}

/// One column's file inside a segment.
#[derive(Debug, Clone, Default)]
pub struct ColumnFile {
    blocks: Vec<BlockHeader>,
    eof: u64,
    missing_below: RowNumber,
}

impl ColumnFile {
    fn with_missing_below(missing_below: RowNumber) -> Self {
        Self {
            missing_below,
            ..Self::default()
        }
    }

    pub fn blocks(&self) -> &[BlockHeader] {
        &self.blocks
    }

    /// Physical end of the file, including blocks of aborted writers.
    pub fn eof(&self) -> u64 {
        self.eof
    }

    /// Rows below this number predate the column and carry its missing value.
    pub fn missing_below(&self) -> RowNumber {
        self.missing_below
    }

    pub fn visible_blocks(&self, view: &ReadView, manager: &TxnIdManager) -> Vec<BlockHeader> {
        self.blocks
            .iter()
            .filter(|b| view.sees(manager, &b.version))
            .copied()
            .collect()
    }
}

/// Per-segment metadata as seen under one read view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTotals {
    pub segno: SegmentNo,
    pub state: SegmentState,
    pub total_tuples: u64,
    pub varblock_count: u64,
    pub modcount: u64,
    /// Number of column files the segment carries.
    pub vp_entries: usize,
    pub eof: Vec<u64>,
    pub eof_uncompressed: Vec<u64>,
}

/// A segment file: one column file per column plus the row allocator.
#[derive(Debug, Clone)]
pub struct SegmentFile {
    segno: SegmentNo,
    state: SegmentState,
    columns: Vec<ColumnFile>,
    fast_sequence: FastSequence,
    modcount: u64,
    write_locked: bool,
}

impl SegmentFile {
    fn new(segno: SegmentNo, num_columns: usize) -> Self {
        Self {
            segno,
            state: SegmentState::Default,
            columns: vec![ColumnFile::default(); num_columns],
            fast_sequence: FastSequence::default(),
            modcount: 0,
            write_locked: false,
        }
    }

    pub fn segno(&self) -> SegmentNo {
        self.segno
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn is_write_locked(&self) -> bool {
        self.write_locked
    }

    pub fn vp_entries(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, column: ColumnIndex) -> Option<&ColumnFile> {
        self.columns.get(column)
    }

    pub fn column_file(&self, column: ColumnIndex) -> Result<&ColumnFile> {
        self.columns.get(column).ok_or_else(|| {
            Error::Internal(format!(
                "segment {} has no file for column {column}",
                self.segno
            ))
        })
    }

    pub fn fast_sequence(&self) -> &FastSequence {
        &self.fast_sequence
    }

    pub fn reserve_rows(&mut self, count: u64) -> Result<Range<RowNumber>> {
        let range = self.fast_sequence.reserve(count)?;
        tracing::trace!(
            "[AOCS] segment {} reserved rows {}..{}",
            self.segno,
            range.start,
            range.end
        );
        Ok(range)
    }

    pub fn modcount(&self) -> u64 {
        self.modcount
    }

    pub fn bump_modcount(&mut self) {
        self.modcount += 1;
    }

    /// Row count of the blocks of column 0 visible under `view`.
    pub fn visible_tuples(&self, view: &ReadView, manager: &TxnIdManager) -> u64 {
        self.columns.first().map_or(0, |c| {
            c.blocks
                .iter()
                .filter(|b| view.sees(manager, &b.version))
                .map(|b| b.row_count)
                .sum()
        })
    }

    pub fn totals(&self, view: &ReadView, manager: &TxnIdManager) -> SegmentTotals {
        let mut eof = Vec::with_capacity(self.columns.len());
        let mut eof_uncompressed = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let (bytes, raw) = col
                .blocks
                .iter()
                .filter(|b| view.sees(manager, &b.version))
                .fold((0u64, 0u64), |(a, u), b| {
                    (a + b.byte_len, u + b.uncompressed_len)
                });
            eof.push(bytes);
            eof_uncompressed.push(raw);
        }
        let (total_tuples, varblock_count) = self.columns.first().map_or((0, 0), |c| {
            c.blocks
                .iter()
                .filter(|b| view.sees(manager, &b.version))
                .fold((0u64, 0u64), |(t, n), b| (t + b.row_count, n + 1))
        });
        SegmentTotals {
            segno: self.segno,
            state: self.state,
            total_tuples,
            varblock_count,
            modcount: self.modcount,
            vp_entries: self.columns.len(),
            eof,
            eof_uncompressed,
        }
    }

    fn all_keys(&self) -> impl Iterator<Item = PhysicalKey> + '_ {
        self.columns
            .iter()
            .flat_map(|c| c.blocks.iter().map(|b| b.key))
    }
}

/// Every segment file of one table.
#[derive(Debug, Clone)]
pub struct SegmentCatalog {
    segments: BTreeMap<SegmentNo, SegmentFile>,
    num_columns: usize,
    max_segments: SegmentNo,
}

impl SegmentCatalog {
    pub fn new(num_columns: usize, max_segments: SegmentNo) -> Self {
        Self {
            segments: BTreeMap::new(),
            num_columns,
            max_segments,
        }
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn segment(&self, segno: SegmentNo) -> Result<&SegmentFile> {
        self.segments.get(&segno).ok_or(Error::NotFound)
    }

    pub fn segment_mut(&mut self, segno: SegmentNo) -> Result<&mut SegmentFile> {
        self.segments.get_mut(&segno).ok_or(Error::NotFound)
    }

    /// Segments in segment-number order.
    pub fn segments(&self) -> impl Iterator<Item = &SegmentFile> {
        self.segments.values()
    }

    /// Segments a reader should visit: everything not awaiting drop.
    pub fn readable_segments(&self) -> impl Iterator<Item = &SegmentFile> {
        self.segments
            .values()
            .filter(|s| s.state == SegmentState::Default)
    }

    /// Pick a segment for a new writer and lock it for writing.
    ///
    /// Prefers the least-loaded unlocked segment in the default state; otherwise creates the
    /// lowest unused segment number in `1..=max_segments`.
    pub fn choose_segno_for_write(&mut self) -> Result<SegmentNo> {
        let candidate = self
            .segments
            .values()
            .filter(|s| s.state == SegmentState::Default && !s.write_locked)
            .min_by_key(|s| (s.fast_sequence.next_row(), s.segno))
            .map(|s| s.segno);

        let segno = match candidate {
            Some(segno) => segno,
            None => {
                let segno = (1..=self.max_segments)
                    .find(|n| !self.segments.contains_key(n))
                    .ok_or_else(|| {
                        Error::Internal(format!(
                            "no segment file available for writing (limit {})",
                            self.max_segments
                        ))
                    })?;
                self.segments
                    .insert(segno, SegmentFile::new(segno, self.num_columns));
                tracing::debug!("[AOCS] created segment file {segno}");
                segno
            }
        };

        let seg = self.segment_mut(segno)?;
        seg.write_locked = true;
        Ok(segno)
    }

    pub fn release_write(&mut self, segno: SegmentNo) {
        if let Some(seg) = self.segments.get_mut(&segno) {
            seg.write_locked = false;
        }
    }

    /// Append a column file to every segment that can still be read. Existing rows of those
    /// segments report the column's missing value.
    pub fn add_column(&mut self) -> ColumnIndex {
        let column = self.num_columns;
        self.num_columns += 1;
        for seg in self.segments.values_mut() {
            if seg.state == SegmentState::Default {
                let missing_below = seg.fast_sequence.next_row();
                seg.columns.push(ColumnFile::with_missing_below(missing_below));
            }
        }
        column
    }

    /// Store an encoded block and register it at the end of the column file.
    pub fn persist_block<P: Pager + ?Sized>(
        &mut self,
        pager: &P,
        segno: SegmentNo,
        column: ColumnIndex,
        block: FinishedBlock,
        version: RowVersion,
    ) -> Result<BlockHeader> {
        let key = pager
            .alloc_many(1)?
            .pop()
            .ok_or_else(|| Error::Internal("pager returned no key".into()))?;
        let byte_len = block.encoded.bytes.len() as u64;
        let row_count = block.encoded.row_count;
        let uncompressed_len = block.encoded.uncompressed_len;
        pager.batch_put(&[BatchPut::Raw {
            key,
            bytes: block.encoded.bytes,
        }])?;

        let seg = self.segment_mut(segno)?;
        let file = seg.columns.get_mut(column).ok_or_else(|| {
            Error::Internal(format!("segment {segno} has no file for column {column}"))
        })?;
        let header = BlockHeader {
            first_row: block.first_row,
            row_count,
            file_offset: file.eof,
            byte_len,
            uncompressed_len,
            key,
            version,
        };
        file.eof += byte_len;
        file.blocks.push(header);
        tracing::trace!(
            "[AOCS] seg {segno} col {column}: block rows {}..={} at offset {}",
            header.first_row,
            header.last_row(),
            header.file_offset
        );
        Ok(header)
    }

    pub fn mark_awaiting_drop(&mut self, segno: SegmentNo) -> Result<()> {
        let seg = self.segment_mut(segno)?;
        if seg.write_locked {
            return Err(Error::TransactionContextError(format!(
                "segment {segno} is being written"
            )));
        }
        seg.state = SegmentState::AwaitingDrop;
        Ok(())
    }

    /// Drop every block of a segment and return the keys to free. The segment number stays
    /// allocated and its row allocator keeps counting.
    pub fn clear_segment(&mut self, segno: SegmentNo) -> Result<Vec<PhysicalKey>> {
        let num_columns = self.num_columns;
        let seg = self.segment_mut(segno)?;
        let keys: Vec<PhysicalKey> = seg.all_keys().collect();
        seg.columns = vec![ColumnFile::default(); num_columns];
        seg.state = SegmentState::Default;
        seg.modcount += 1;
        Ok(keys)
    }

    /// Forget every segment and return all keys to free.
    pub fn truncate(&mut self) -> Vec<PhysicalKey> {
        let keys = self.segments.values().flat_map(|s| s.all_keys()).collect();
        self.segments.clear();
        keys
    }

    pub fn totals(&self, view: &ReadView, manager: &TxnIdManager) -> Vec<SegmentTotals> {
        self.segments
            .values()
            .map(|s| s.totals(view, manager))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_codec::encode_block;
    use crate::pager::MemPager;
    use aocs_types::{ColumnType, Datum};

    fn block(first_row: RowNumber, n: i64) -> FinishedBlock {
        let values: Vec<Datum> = (0..n).map(Datum::from).collect();
        FinishedBlock {
            first_row,
            encoded: encode_block(ColumnType::Integer, &values).unwrap(),
        }
    }

    #[test]
    fn locked_segments_are_not_shared() {
        let mut catalog = SegmentCatalog::new(1, 4);
        let a = catalog.choose_segno_for_write().unwrap();
        let b = catalog.choose_segno_for_write().unwrap();
        assert_eq!((a, b), (1, 2));
        catalog.release_write(a);
        assert_eq!(catalog.choose_segno_for_write().unwrap(), 1);
    }

    #[test]
    fn exhausted_segments_error() {
        let mut catalog = SegmentCatalog::new(1, 1);
        catalog.choose_segno_for_write().unwrap();
        assert!(matches!(
            catalog.choose_segno_for_write(),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn least_loaded_segment_is_preferred() {
        let mut catalog = SegmentCatalog::new(1, 4);
        let a = catalog.choose_segno_for_write().unwrap();
        let b = catalog.choose_segno_for_write().unwrap();
        catalog.segment_mut(a).unwrap().reserve_rows(500).unwrap();
        catalog.segment_mut(b).unwrap().reserve_rows(10).unwrap();
        catalog.release_write(a);
        catalog.release_write(b);
        assert_eq!(catalog.choose_segno_for_write().unwrap(), b);
    }

    #[test]
    fn totals_follow_visibility() {
        let manager = TxnIdManager::new();
        let pager = MemPager::new();
        let mut catalog = SegmentCatalog::new(1, 4);
        let seg = catalog.choose_segno_for_write().unwrap();
        let writer = manager.begin_transaction();
        catalog
            .persist_block(&pager, seg, 0, block(0, 10), RowVersion::created(writer.write_stamp()))
            .unwrap();

        let before = catalog.totals(&ReadView::Mvcc(manager.latest_snapshot()), &manager);
        assert_eq!(before[0].total_tuples, 0);

        manager.mark_committed(writer.txn_id);
        let after = catalog.totals(&ReadView::Mvcc(manager.latest_snapshot()), &manager);
        assert_eq!(after[0].total_tuples, 10);
        assert_eq!(after[0].varblock_count, 1);
        assert!(after[0].eof[0] > 0);
    }

    #[test]
    fn add_column_skips_awaiting_drop_segments() {
        let mut catalog = SegmentCatalog::new(1, 4);
        let a = catalog.choose_segno_for_write().unwrap();
        let b = catalog.choose_segno_for_write().unwrap();
        catalog.segment_mut(a).unwrap().reserve_rows(40).unwrap();
        catalog.release_write(a);
        catalog.release_write(b);
        catalog.mark_awaiting_drop(b).unwrap();

        let col = catalog.add_column();
        assert_eq!(col, 1);
        assert_eq!(catalog.segment(a).unwrap().vp_entries(), 2);
        assert_eq!(catalog.segment(b).unwrap().vp_entries(), 1);
        assert_eq!(
            catalog.segment(a).unwrap().column(1).unwrap().missing_below(),
            40
        );
    }
}
