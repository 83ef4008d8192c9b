use aocs_result::Result;
use aocs_transaction::{RowVersion, WriteStamp};
use aocs_types::{ColumnIndex, RowNumber, SegmentNo};

use super::{BlockDirectory, DirectoryEntry, RowHandle};

#[derive(Debug, Default)]
struct ColumnMinipage {
    entries: Vec<DirectoryEntry>,
    /// Placeholder row the next persisted minipage replaces.
    placeholder: Option<RowHandle>,
}

/// Accumulates directory entries for one segment on behalf of a single writer.
///
/// Entries are buffered per column and persisted as a minipage row when the minipage fills
/// up and when the writer finishes. Dropping the writer without [`finish`](Self::finish)
/// discards buffered entries of columns without a placeholder; a placeholder row is still
/// overwritten with the column's buffered entries so no provisional entry outlives the
/// writer.
#[derive(Debug)]
pub struct BlockDirectoryWriter {
    directory: BlockDirectory,
    segno: SegmentNo,
    stamp: WriteStamp,
    columns: Vec<ColumnMinipage>,
}

impl BlockDirectoryWriter {
    pub(super) fn new(directory: BlockDirectory, segno: SegmentNo, stamp: WriteStamp) -> Self {
        Self {
            directory,
            segno,
            stamp,
            columns: Vec::new(),
        }
    }

    pub fn segno(&self) -> SegmentNo {
        self.segno
    }

    fn minipage(&mut self, column: ColumnIndex) -> &mut ColumnMinipage {
        if self.columns.len() <= column {
            self.columns.resize_with(column + 1, ColumnMinipage::default);
        }
        &mut self.columns[column]
    }

    /// Record a stored block. Returns `false` for empty blocks, which are not recorded.
    pub fn insert_entry(
        &mut self,
        column: ColumnIndex,
        first_row: RowNumber,
        file_offset: u64,
        row_count: u64,
    ) -> Result<bool> {
        if row_count == 0 {
            return Ok(false);
        }
        let capacity = self.directory.minipage_entries();
        if self.minipage(column).entries.len() >= capacity {
            self.write_minipage(column)?;
        }
        self.minipage(column).entries.push(DirectoryEntry::finalized(
            column,
            first_row,
            file_offset,
            row_count,
        ));
        Ok(true)
    }

    /// Persist a placeholder row covering every row from `first_row` on.
    ///
    /// The provisional entry is not kept in memory; the next [`write_minipage`] for the
    /// column overwrites the persisted row with the real entries.
    ///
    /// [`write_minipage`]: Self::write_minipage
    pub fn insert_placeholder(
        &mut self,
        column: ColumnIndex,
        first_row: RowNumber,
        file_offset: u64,
    ) -> Result<()> {
        let directory = self.directory.clone();
        let segno = self.segno;
        let version = RowVersion::created(self.stamp);
        let minipage = self.minipage(column);
        let mut entries = minipage.entries.clone();
        entries.push(DirectoryEntry::provisional(column, first_row, file_offset));
        let key = entries[0].first_row;
        let handle = match minipage.placeholder {
            Some(handle) => {
                directory.overwrite_row(handle, entries)?;
                handle
            }
            None => directory.append_row(segno, column, key, version, entries),
        };
        minipage.placeholder = Some(handle);
        tracing::debug!(
            "[BLKDIR] seg {segno} col {column}: placeholder from row {first_row} at offset {file_offset}"
        );
        Ok(())
    }

    /// Persist the buffered entries of `column` and start a fresh minipage.
    pub fn write_minipage(&mut self, column: ColumnIndex) -> Result<()> {
        let directory = self.directory.clone();
        let segno = self.segno;
        let version = RowVersion::created(self.stamp);
        let minipage = self.minipage(column);
        let entries = std::mem::take(&mut minipage.entries);
        match minipage.placeholder.take() {
            Some(handle) => directory.overwrite_row(handle, entries),
            None => {
                if let Some(first) = entries.first() {
                    directory.append_row(segno, column, first.first_row, version, entries);
                }
                Ok(())
            }
        }
    }

    /// Persist every buffered minipage and finalize outstanding placeholders.
    pub fn finish(mut self) -> Result<()> {
        for column in 0..self.columns.len() {
            let pending = &self.columns[column];
            if !pending.entries.is_empty() || pending.placeholder.is_some() {
                self.write_minipage(column)?;
            }
        }
        tracing::trace!("[BLKDIR] writer for seg {} finished", self.segno);
        Ok(())
    }
}

impl Drop for BlockDirectoryWriter {
    fn drop(&mut self) {
        for column in 0..self.columns.len() {
            let Some(handle) = self.columns[column].placeholder.take() else {
                continue;
            };
            let entries = std::mem::take(&mut self.columns[column].entries);
            if let Err(err) = self.directory.overwrite_row(handle, entries) {
                tracing::warn!(
                    "[BLKDIR] seg {} col {column}: placeholder left provisional: {err}",
                    self.segno
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aocs_transaction::{ReadView, TxnIdManager};

    #[test]
    fn full_minipages_spill_into_new_rows() {
        let manager = TxnIdManager::new();
        let dir = BlockDirectory::new(manager.clone(), 2);
        let txn = manager.begin_transaction();
        let mut w = dir.writer(1, txn.write_stamp());
        for i in 0..5u64 {
            assert!(w.insert_entry(0, i * 10, i * 100, 10).unwrap());
        }
        assert!(!w.insert_entry(0, 50, 500, 0).unwrap());
        w.finish().unwrap();

        let rows = dir.rows(1, 0);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.entries.len()).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        manager.mark_committed(txn.txn_id);
        let view = ReadView::Mvcc(manager.latest_snapshot());
        assert!(dir.covers_row(&view, 1, 0, 49));
        assert!(!dir.covers_row(&view, 1, 0, 50));
    }

    #[test]
    fn placeholder_is_overwritten_in_place() {
        let manager = TxnIdManager::new();
        let dir = BlockDirectory::new(manager.clone(), 8);
        let txn = manager.begin_transaction();
        let view = ReadView::SelfView(txn);

        let mut w = dir.writer(1, txn.write_stamp());
        w.insert_placeholder(0, 100, 0).unwrap();
        assert_eq!(dir.rows(1, 0).len(), 1);
        assert!(dir.covers_row(&view, 1, 0, 1_000_000));
        assert!(!dir.covers_row(&view, 1, 0, 99));

        w.insert_entry(0, 100, 0, 20).unwrap();
        w.finish().unwrap();

        let rows = dir.rows(1, 0);
        assert_eq!(rows.len(), 1, "placeholder row must be reused");
        assert!(!rows[0].has_provisional());
        assert!(dir.covers_row(&view, 1, 0, 119));
        assert!(!dir.covers_row(&view, 1, 0, 120));
    }

    #[test]
    fn dropped_writer_finalizes_its_placeholders() {
        let manager = TxnIdManager::new();
        let dir = BlockDirectory::new(manager.clone(), 8);
        let txn = manager.begin_transaction();
        let view = ReadView::SelfView(txn);

        let mut w = dir.writer(2, txn.write_stamp());
        w.insert_placeholder(0, 0, 0).unwrap();
        w.insert_placeholder(1, 0, 0).unwrap();
        w.insert_entry(0, 0, 0, 30).unwrap();
        assert!(dir.covers_row(&view, 2, 1, 5_000));
        drop(w);

        for column in 0..2 {
            let rows = dir.rows(2, column);
            assert_eq!(rows.len(), 1);
            assert!(!rows[0].has_provisional());
        }
        assert!(dir.covers_row(&view, 2, 0, 29));
        assert!(!dir.covers_row(&view, 2, 0, 30));
        assert!(!dir.covers_row(&view, 2, 1, 0));
    }

    #[test]
    fn empty_writer_finalizes_placeholder_without_entries() {
        let manager = TxnIdManager::new();
        let dir = BlockDirectory::new(manager.clone(), 8);
        let txn = manager.begin_transaction();
        let mut w = dir.writer(3, txn.write_stamp());
        w.insert_placeholder(1, 0, 0).unwrap();
        w.finish().unwrap();

        let rows = dir.rows(3, 1);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].entries.is_empty());
        assert!(!dir.covers_row(&ReadView::SelfView(txn), 3, 1, 0));
    }
}
