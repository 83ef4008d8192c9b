//! Visibility map.
//!
//! A delete never touches column files. It adds row numbers to a [`DeleteSet`] stamped
//! with the deleting transaction and command, and readers hide a row when any delete set
//! they can see contains it. Delete sets are published once, when the deleting statement
//! finishes, and are never retracted; an aborted deleter simply makes its set inapplicable.

mod delete;

pub use delete::{DeleteOutcome, VisimapDelete};

use std::sync::{Arc, RwLock};

use aocs_transaction::{ReadView, RowVersion, TransactionSnapshot, TxnIdManager};
use aocs_types::{RowLocator, SegmentNo};
use roaring::RoaringTreemap;
use rustc_hash::FxHashMap;

/// Rows of one segment hidden by one statement.
#[derive(Debug, Clone)]
pub struct DeleteSet {
    pub version: RowVersion,
    pub rows: RoaringTreemap,
}

#[derive(Debug, Default)]
struct VisimapStore {
    segments: FxHashMap<SegmentNo, Vec<DeleteSet>>,
}

/// Shared handle to a table's visibility map.
#[derive(Clone, Debug)]
pub struct VisibilityMap {
    inner: Arc<RwLock<VisimapStore>>,
    txn_manager: TxnIdManager,
}

impl VisibilityMap {
    pub fn new(txn_manager: TxnIdManager) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VisimapStore::default())),
            txn_manager,
        }
    }

    pub fn txn_manager(&self) -> &TxnIdManager {
        &self.txn_manager
    }

    /// Whether the delete recorded by `version` hides rows from `view`.
    ///
    /// A dirty reader honours committed deletes and its own. An in-progress delete by
    /// another transaction leaves the row in place and is noted as the view's xmax.
    fn applies(&self, view: &ReadView, version: &RowVersion) -> bool {
        match view {
            ReadView::Any => false,
            ReadView::Dirty(dirty) => {
                if version.created_by == dirty.txn_id() {
                    return true;
                }
                let status = self.txn_manager.status(version.created_by);
                if status.is_active() {
                    dirty.note_deleter(version.created_by);
                }
                status.is_committed()
            }
            _ => view.sees(&self.txn_manager, version),
        }
    }

    /// Whether `locator` is not hidden by any delete `view` can see.
    pub fn is_visible(&self, view: &ReadView, locator: RowLocator) -> bool {
        if view.is_any() {
            return true;
        }
        let store = self.inner.read().expect("visimap lock poisoned");
        let Some(sets) = store.segments.get(&locator.segno()) else {
            return true;
        };
        let row = locator.row_number();
        let hidden = sets
            .iter()
            .any(|set| set.rows.contains(row) && self.applies(view, &set.version));
        tracing::trace!("[VISIMAP] is_visible {locator}: {}", !hidden);
        !hidden
    }

    /// Union of the rows of `segno` hidden from `view`.
    pub fn hidden_rows(&self, view: &ReadView, segno: SegmentNo) -> RoaringTreemap {
        let mut hidden = RoaringTreemap::new();
        if view.is_any() {
            return hidden;
        }
        let store = self.inner.read().expect("visimap lock poisoned");
        if let Some(sets) = store.segments.get(&segno) {
            for set in sets.iter().filter(|s| self.applies(view, &s.version)) {
                hidden |= &set.rows;
            }
        }
        hidden
    }

    pub fn hidden_count_for_segment(&self, view: &ReadView, segno: SegmentNo) -> u64 {
        self.hidden_rows(view, segno).len()
    }

    /// Number of rows of the whole table hidden from `view`.
    pub fn hidden_count(&self, view: &ReadView) -> u64 {
        let segnos: Vec<SegmentNo> = {
            let store = self.inner.read().expect("visimap lock poisoned");
            store.segments.keys().copied().collect()
        };
        segnos
            .into_iter()
            .map(|segno| self.hidden_count_for_segment(view, segno))
            .sum()
    }

    /// Version of a published, not aborted delete covering `locator`, newest first.
    pub fn deleter_of(&self, locator: RowLocator) -> Option<RowVersion> {
        let store = self.inner.read().expect("visimap lock poisoned");
        let sets = store.segments.get(&locator.segno())?;
        sets.iter()
            .rev()
            .filter(|set| set.rows.contains(locator.row_number()))
            .map(|set| set.version)
            .find(|v| !self.txn_manager.status(v.created_by).is_aborted())
    }

    /// Make a delete set visible to readers.
    pub fn publish(&self, segno: SegmentNo, set: DeleteSet) {
        if set.rows.is_empty() {
            return;
        }
        tracing::debug!(
            "[VISIMAP] seg {segno}: published {} hidden rows by txn {}/{}",
            set.rows.len(),
            set.version.created_by,
            set.version.created_cmd
        );
        let mut store = self.inner.write().expect("visimap lock poisoned");
        store.segments.entry(segno).or_default().push(set);
    }

    /// Start recording deletes for one statement.
    pub fn delete_context(&self, snapshot: TransactionSnapshot) -> VisimapDelete {
        VisimapDelete::new(self.clone(), snapshot)
    }

    pub fn remove_segment(&self, segno: SegmentNo) {
        let mut store = self.inner.write().expect("visimap lock poisoned");
        store.segments.remove(&segno);
    }

    pub fn clear(&self) {
        let mut store = self.inner.write().expect("visimap lock poisoned");
        store.segments.clear();
    }
}
