//! Block directory.
//!
//! For every `(segment, column)` the directory stores *minipage rows*: small, sorted arrays
//! of [`DirectoryEntry`] values, each describing one stored block (first row, row count,
//! file offset). Writers accumulate entries in memory and persist a minipage row when it
//! fills up or when the writer finishes.
//!
//! A writer on a table with a unique index also persists a *placeholder* row the moment it
//! starts: a single provisional entry covering every row from the writer's first row
//! onward. Concurrent unique checks see it immediately, which closes the window in which
//! freshly appended rows are not yet described by any real entry. The writer's first real
//! minipage overwrites the placeholder row in place.

mod writer;

pub use writer::BlockDirectoryWriter;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use aocs_result::{Error, Result};
use aocs_transaction::{ReadView, RowVersion, TxnIdManager, WriteStamp};
use aocs_types::{ColumnIndex, MAX_ROW_NUMBER, RowLocator, RowNumber, SegmentNo};
use rustc_hash::FxHashMap;

/// Whether an entry describes a written block or stands in for rows still being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Provisional,
    Finalized,
}

/// One block of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub first_row: RowNumber,
    pub row_count: u64,
    pub file_offset: u64,
    pub column: ColumnIndex,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn finalized(
        column: ColumnIndex,
        first_row: RowNumber,
        file_offset: u64,
        row_count: u64,
    ) -> Self {
        Self {
            first_row,
            row_count,
            file_offset,
            column,
            kind: EntryKind::Finalized,
        }
    }

    /// Entry covering every row from `first_row` on.
    pub fn provisional(column: ColumnIndex, first_row: RowNumber, file_offset: u64) -> Self {
        Self {
            first_row,
            row_count: MAX_ROW_NUMBER,
            file_offset,
            column,
            kind: EntryKind::Provisional,
        }
    }

    #[inline]
    pub fn is_provisional(&self) -> bool {
        self.kind == EntryKind::Provisional
    }

    #[inline]
    pub fn covers(&self, row: RowNumber) -> bool {
        match self.kind {
            EntryKind::Provisional => row >= self.first_row,
            EntryKind::Finalized => {
                row >= self.first_row && row - self.first_row < self.row_count
            }
        }
    }
}

/// A persisted minipage.
#[derive(Debug, Clone)]
pub struct MinipageRow {
    id: u64,
    /// Lookup key: the first row described by this minipage.
    pub first_row: RowNumber,
    pub version: RowVersion,
    pub entries: Vec<DirectoryEntry>,
}

impl MinipageRow {
    pub fn has_provisional(&self) -> bool {
        self.entries.iter().any(DirectoryEntry::is_provisional)
    }
}

/// Identifies a persisted minipage row so its writer can overwrite it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle {
    segno: SegmentNo,
    column: ColumnIndex,
    id: u64,
}

#[derive(Debug, Default)]
struct DirectoryStore {
    rows: FxHashMap<(SegmentNo, ColumnIndex), Vec<MinipageRow>>,
}

/// Shared handle to a table's block directory.
#[derive(Clone, Debug)]
pub struct BlockDirectory {
    store: Arc<RwLock<DirectoryStore>>,
    next_row_id: Arc<AtomicU64>,
    txn_manager: TxnIdManager,
    minipage_entries: usize,
}

impl BlockDirectory {
    pub fn new(txn_manager: TxnIdManager, minipage_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(DirectoryStore::default())),
            next_row_id: Arc::new(AtomicU64::new(1)),
            txn_manager,
            minipage_entries: minipage_entries.max(1),
        }
    }

    pub fn minipage_entries(&self) -> usize {
        self.minipage_entries
    }

    /// Whether no minipage row has ever been persisted.
    pub fn is_empty(&self) -> bool {
        self.store
            .read()
            .expect("block directory lock poisoned")
            .rows
            .values()
            .all(Vec::is_empty)
    }

    /// Start a writer for `segno`. Entries it persists carry `stamp`.
    pub fn writer(&self, segno: SegmentNo, stamp: WriteStamp) -> BlockDirectoryWriter {
        BlockDirectoryWriter::new(self.clone(), segno, stamp)
    }

    /// Persisted minipage rows of one `(segment, column)`, in first-row order.
    pub fn rows(&self, segno: SegmentNo, column: ColumnIndex) -> Vec<MinipageRow> {
        self.store
            .read()
            .expect("block directory lock poisoned")
            .rows
            .get(&(segno, column))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn append_row(
        &self,
        segno: SegmentNo,
        column: ColumnIndex,
        first_row: RowNumber,
        version: RowVersion,
        entries: Vec<DirectoryEntry>,
    ) -> RowHandle {
        let id = self.next_row_id.fetch_add(1, Ordering::Relaxed);
        let mut store = self.store.write().expect("block directory lock poisoned");
        let rows = store.rows.entry((segno, column)).or_default();
        let at = rows.partition_point(|r| r.first_row <= first_row);
        tracing::trace!(
            "[BLKDIR] seg {segno} col {column}: minipage row {id} at first_row {first_row} with {} entries",
            entries.len()
        );
        rows.insert(
            at,
            MinipageRow {
                id,
                first_row,
                version,
                entries,
            },
        );
        RowHandle { segno, column, id }
    }

    /// Replace the entries of a placeholder row in place.
    pub(crate) fn overwrite_row(
        &self,
        handle: RowHandle,
        entries: Vec<DirectoryEntry>,
    ) -> Result<()> {
        let mut store = self.store.write().expect("block directory lock poisoned");
        let row = store
            .rows
            .get_mut(&(handle.segno, handle.column))
            .and_then(|rows| rows.iter_mut().find(|r| r.id == handle.id))
            .ok_or_else(|| {
                Error::Internal(format!(
                    "minipage row {} of seg {} col {} vanished",
                    handle.id, handle.segno, handle.column
                ))
            })?;
        if !row.has_provisional() {
            return Err(Error::Internal(format!(
                "minipage row {} is not a placeholder",
                handle.id
            )));
        }
        tracing::trace!(
            "[BLKDIR] seg {} col {}: placeholder row {} finalized with {} entries",
            handle.segno,
            handle.column,
            handle.id,
            entries.len()
        );
        row.entries = entries;
        Ok(())
    }

    /// Visit rows of `(segno, column)` with `first_row <= row`, newest key first, that are
    /// visible under `view`, until `f` returns `Some`.
    fn scan_backward<T>(
        &self,
        view: &ReadView,
        segno: SegmentNo,
        column: ColumnIndex,
        row: RowNumber,
        f: impl FnMut(&MinipageRow) -> Option<T>,
    ) -> Option<T> {
        let store = self.store.read().expect("block directory lock poisoned");
        let rows = store.rows.get(&(segno, column))?;
        let end = rows.partition_point(|r| r.first_row <= row);
        rows[..end]
            .iter()
            .rev()
            .filter(|r| view.sees(&self.txn_manager, &r.version))
            .find_map(f)
    }

    /// Entry of the block holding `locator` in `column`, for point lookups.
    pub fn get_entry(
        &self,
        view: &ReadView,
        locator: RowLocator,
        column: ColumnIndex,
    ) -> Option<DirectoryEntry> {
        let row = locator.row_number();
        self.scan_backward(view, locator.segno(), column, row, |minipage| {
            let entries = &minipage.entries;
            let idx = entries.partition_point(|e| e.first_row <= row).checked_sub(1)?;
            let entry = entries[idx];
            (!entry.is_provisional() && entry.covers(row)).then_some(entry)
        })
    }

    /// Entry a partial scan starting at `row` should begin reading from.
    ///
    /// Uses the visible minipage with the greatest first row not after `row`. Within it,
    /// picks the entry covering `row`; if `row` falls in a hole between two entries, the next
    /// entry; if it lies past the last entry, the last entry. Returns `None` when no minipage
    /// starts at or before `row`.
    pub fn get_entry_for_partial_scan(
        &self,
        view: &ReadView,
        segno: SegmentNo,
        column: ColumnIndex,
        row: RowNumber,
    ) -> Option<DirectoryEntry> {
        self.scan_backward(view, segno, column, row, |minipage| {
            // The newest qualifying minipage decides, even when it has nothing usable.
            Some(Self::choose_partial_scan_entry(minipage, row))
        })
        .flatten()
    }

    fn choose_partial_scan_entry(minipage: &MinipageRow, row: RowNumber) -> Option<DirectoryEntry> {
        let entries: Vec<&DirectoryEntry> = minipage
            .entries
            .iter()
            .filter(|e| !e.is_provisional())
            .collect();
        if entries.is_empty() {
            return None;
        }
        let next = entries.partition_point(|e| e.first_row <= row);
        let chosen = if next == 0 {
            entries[0]
        } else if next < entries.len() {
            let prev = entries[next - 1];
            if prev.covers(row) { prev } else { entries[next] }
        } else {
            entries[entries.len() - 1]
        };
        Some(*chosen)
    }

    /// Whether some visible minipage row of `column` has an entry covering `row`.
    ///
    /// Under a dirty view the view is left describing the in-progress writers of the row that
    /// matched.
    pub fn covers_row(
        &self,
        view: &ReadView,
        segno: SegmentNo,
        column: ColumnIndex,
        row: RowNumber,
    ) -> bool {
        let found = self
            .scan_backward(view, segno, column, row, |minipage| {
                minipage.entries.iter().any(|e| e.covers(row)).then_some(())
            })
            .is_some();
        tracing::trace!("[BLKDIR] covers_row seg {segno} col {column} row {row}: {found}");
        found
    }

    /// Drop every row of a segment.
    pub fn remove_segment(&self, segno: SegmentNo) {
        let mut store = self.store.write().expect("block directory lock poisoned");
        store.rows.retain(|(s, _), _| *s != segno);
    }

    pub fn clear(&self) {
        let mut store = self.store.write().expect("block directory lock poisoned");
        store.rows.clear();
    }
}
