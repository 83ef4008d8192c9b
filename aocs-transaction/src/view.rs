//! Read views: the visibility regime a reader evaluates stored versions under.
use std::cell::Cell;

use crate::mvcc::{RowVersion, TXN_ID_NONE, TransactionSnapshot, TxnId, TxnIdManager};

/// Visibility regime for one reader.
#[derive(Debug, Clone)]
pub enum ReadView {
    /// Snapshot isolation, command-aware inside the own transaction.
    Mvcc(TransactionSnapshot),
    /// Every committed write plus every write of the own transaction, including the
    /// current command.
    SelfView(TransactionSnapshot),
    /// Committed and in-progress writes. In-progress writers are reported through
    /// [`DirtyView::xmin`] / [`DirtyView::xmax`].
    Dirty(DirtyView),
    /// Everything, regardless of writer status.
    Any,
}

/// State of a dirty read: the reading transaction plus the in-progress writers observed by
/// the most recent visibility check.
#[derive(Debug, Clone)]
pub struct DirtyView {
    txn_id: TxnId,
    xmin: Cell<Option<TxnId>>,
    xmax: Cell<Option<TxnId>>,
}

impl DirtyView {
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            xmin: Cell::new(None),
            xmax: Cell::new(None),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// In-progress creator of the last version judged visible.
    pub fn xmin(&self) -> Option<TxnId> {
        self.xmin.get()
    }

    /// In-progress deleter of the last version judged visible.
    pub fn xmax(&self) -> Option<TxnId> {
        self.xmax.get()
    }

    /// Record `txn_id` as an in-progress deleter of the row last judged visible.
    pub fn note_deleter(&self, txn_id: TxnId) {
        self.xmax.set(Some(txn_id));
    }

    pub fn reset(&self) {
        self.xmin.set(None);
        self.xmax.set(None);
    }

    fn is_own(&self, txn_id: TxnId) -> bool {
        txn_id == self.txn_id && txn_id != TXN_ID_NONE
    }

    fn sees(&self, manager: &TxnIdManager, version: &RowVersion) -> bool {
        self.reset();

        if !self.is_own(version.created_by) {
            let status = manager.status(version.created_by);
            if status.is_aborted() {
                return false;
            }
            if status.is_active() {
                self.xmin.set(Some(version.created_by));
            }
        }

        match version.deleted_by {
            TXN_ID_NONE => true,
            tx if self.is_own(tx) => false,
            tx => {
                let status = manager.status(tx);
                if status.is_committed() {
                    self.xmin.set(None);
                    false
                } else {
                    if status.is_active() {
                        self.xmax.set(Some(tx));
                    }
                    true
                }
            }
        }
    }
}

impl ReadView {
    pub fn dirty(txn_id: TxnId) -> Self {
        ReadView::Dirty(DirtyView::new(txn_id))
    }

    /// Whether `version` is visible under this view.
    ///
    /// For [`ReadView::Dirty`] this also records in-progress writers, overwriting whatever the
    /// previous call recorded.
    pub fn sees(&self, manager: &TxnIdManager, version: &RowVersion) -> bool {
        match self {
            ReadView::Mvcc(snapshot) => version.is_visible_for(manager, *snapshot),
            ReadView::SelfView(snapshot) => version.is_visible_to_self(manager, *snapshot),
            ReadView::Dirty(dirty) => dirty.sees(manager, version),
            ReadView::Any => true,
        }
    }

    /// The snapshot behind an MVCC or self view.
    pub fn snapshot(&self) -> Option<TransactionSnapshot> {
        match self {
            ReadView::Mvcc(s) | ReadView::SelfView(s) => Some(*s),
            ReadView::Dirty(_) | ReadView::Any => None,
        }
    }

    pub fn as_dirty(&self) -> Option<&DirtyView> {
        match self {
            ReadView::Dirty(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, ReadView::Any)
    }

    pub fn is_self(&self) -> bool {
        matches!(self, ReadView::SelfView(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::WriteStamp;

    #[test]
    fn dirty_view_reports_in_progress_creator() {
        let manager = TxnIdManager::new();
        let writer = manager.begin_transaction();
        let checker = manager.begin_transaction();
        let version = RowVersion::created(writer.write_stamp());

        let view = ReadView::dirty(checker.txn_id);
        assert!(view.sees(&manager, &version));
        let dirty = view.as_dirty().unwrap();
        assert_eq!(dirty.xmin(), Some(writer.txn_id));
        assert_eq!(dirty.xmax(), None);

        manager.mark_committed(writer.txn_id);
        assert!(view.sees(&manager, &version));
        assert_eq!(dirty.xmin(), None);
    }

    #[test]
    fn dirty_view_reports_in_progress_deleter() {
        let manager = TxnIdManager::new();
        let mut version = RowVersion::new(crate::TXN_ID_AUTO_COMMIT);
        let deleter = manager.begin_transaction();
        version.delete(WriteStamp::new(deleter.txn_id, 0));

        let view = ReadView::dirty(manager.begin_transaction().txn_id);
        assert!(view.sees(&manager, &version));
        assert_eq!(view.as_dirty().unwrap().xmax(), Some(deleter.txn_id));

        manager.mark_aborted(deleter.txn_id);
        assert!(view.sees(&manager, &version));
        assert_eq!(view.as_dirty().unwrap().xmax(), None);
    }

    #[test]
    fn dirty_view_hides_aborted_writes() {
        let manager = TxnIdManager::new();
        let writer = manager.begin_transaction();
        let version = RowVersion::created(writer.write_stamp());
        manager.mark_aborted(writer.txn_id);

        let view = ReadView::dirty(manager.begin_transaction().txn_id);
        assert!(!view.sees(&manager, &version));
    }

    #[test]
    fn self_view_sees_current_command() {
        let manager = TxnIdManager::new();
        let txn = manager.begin_transaction();
        let version = RowVersion::created(txn.write_stamp());
        assert!(!ReadView::Mvcc(txn).sees(&manager, &version));
        assert!(ReadView::SelfView(txn).sees(&manager, &version));
        assert!(ReadView::Any.sees(&manager, &version));
    }
}
