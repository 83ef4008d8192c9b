//! Transaction id allocation, commit tracking and row-version visibility.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use aocs_types::CommandId;
use rustc_hash::FxHashMap;

/// Transaction ID type.
pub type TxnId = u64;

/// Transaction ID representing "no transaction" or "not deleted".
pub const TXN_ID_NONE: TxnId = TxnId::MAX;

/// Transaction ID for auto-commit (single-statement) work. Always committed.
pub const TXN_ID_AUTO_COMMIT: TxnId = 1;

/// Minimum ID handed out by [`TxnIdManager::begin_transaction`].
pub const TXN_ID_MIN_MULTI_STATEMENT: TxnId = TXN_ID_AUTO_COMMIT + 1;

#[derive(Debug)]
struct TxnIdManagerInner {
    /// Next transaction ID to allocate.
    next_txn_id: AtomicU64,
    /// Largest committed transaction ID (acts as snapshot watermark).
    last_committed: AtomicU64,
    statuses: Mutex<FxHashMap<TxnId, TxnStatus>>,
}

impl TxnIdManagerInner {
    fn new() -> Self {
        let mut statuses = FxHashMap::with_capacity_and_hasher(1, Default::default());
        statuses.insert(TXN_ID_AUTO_COMMIT, TxnStatus::Committed);

        Self {
            next_txn_id: AtomicU64::new(TXN_ID_MIN_MULTI_STATEMENT),
            last_committed: AtomicU64::new(TXN_ID_AUTO_COMMIT),
            statuses: Mutex::new(statuses),
        }
    }
}

/// Transaction ID manager that hands out IDs and tracks commit status.
///
/// Cloning is cheap; clones share the same allocator and status table.
#[derive(Clone, Debug)]
pub struct TxnIdManager {
    inner: Arc<TxnIdManagerInner>,
}

impl TxnIdManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TxnIdManagerInner::new()),
        }
    }

    /// Begin a new transaction and return its snapshot, positioned at command `0`.
    pub fn begin_transaction(&self) -> TransactionSnapshot {
        let snapshot_id = self.inner.last_committed.load(Ordering::SeqCst);
        let txn_id = self.inner.next_txn_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut guard = self
                .inner
                .statuses
                .lock()
                .expect("txn status lock poisoned");
            guard.insert(txn_id, TxnStatus::Active);
        }
        tracing::debug!("[MVCC] begin txn {txn_id} (snapshot watermark {snapshot_id})");

        TransactionSnapshot {
            txn_id,
            snapshot_id,
            command_id: 0,
        }
    }

    /// Return the status for a given transaction ID.
    pub fn status(&self, txn_id: TxnId) -> TxnStatus {
        if txn_id == TXN_ID_NONE {
            return TxnStatus::None;
        }
        if txn_id == TXN_ID_AUTO_COMMIT {
            return TxnStatus::Committed;
        }

        let guard = self
            .inner
            .statuses
            .lock()
            .expect("txn status lock poisoned");
        guard.get(&txn_id).copied().unwrap_or(TxnStatus::Committed)
    }

    /// Mark a transaction as committed and advance the global watermark.
    pub fn mark_committed(&self, txn_id: TxnId) {
        {
            let mut guard = self
                .inner
                .statuses
                .lock()
                .expect("txn status lock poisoned");
            guard.insert(txn_id, TxnStatus::Committed);
        }

        let mut current = self.inner.last_committed.load(Ordering::SeqCst);
        loop {
            if txn_id <= current {
                break;
            }
            match self.inner.last_committed.compare_exchange(
                current,
                txn_id,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        tracing::debug!("[MVCC] commit txn {txn_id}");
    }

    /// Mark a transaction as aborted.
    pub fn mark_aborted(&self, txn_id: TxnId) {
        let mut guard = self
            .inner
            .statuses
            .lock()
            .expect("txn status lock poisoned");
        guard.insert(txn_id, TxnStatus::Aborted);
        tracing::debug!("[MVCC] abort txn {txn_id}");
    }

    /// Return the latest committed transaction ID (snapshot watermark).
    pub fn last_committed(&self) -> TxnId {
        self.inner.last_committed.load(Ordering::SeqCst)
    }

    /// A read-only snapshot of everything committed so far, owned by no transaction.
    pub fn latest_snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            txn_id: TXN_ID_AUTO_COMMIT,
            snapshot_id: self.last_committed(),
            command_id: 0,
        }
    }
}

impl Default for TxnIdManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The `(transaction, command)` pair a writer stamps onto everything it stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteStamp {
    pub txn_id: TxnId,
    pub command_id: CommandId,
}

impl WriteStamp {
    pub fn new(txn_id: TxnId, command_id: CommandId) -> Self {
        Self { txn_id, command_id }
    }
}

/// Metadata tracking when a stored item was created and deleted.
///
/// # Visibility Rules
///
/// For a reader in transaction `T` at command `c`, an item is visible if:
/// 1. It was created by `T` in a command before `c`, or its creator committed with an ID
///    ≤ the snapshot watermark
/// 2. It was not deleted, or its deleter is `T` at a command ≥ `c`, or the deleter has not
///    committed, or committed after the watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowVersion {
    pub created_by: TxnId,
    pub created_cmd: CommandId,
    pub deleted_by: TxnId,
    pub deleted_cmd: CommandId,
}

impl RowVersion {
    /// Version created by `created_by` at command `0`.
    pub fn new(created_by: TxnId) -> Self {
        Self::created(WriteStamp::new(created_by, 0))
    }

    pub fn created(stamp: WriteStamp) -> Self {
        Self {
            created_by: stamp.txn_id,
            created_cmd: stamp.command_id,
            deleted_by: TXN_ID_NONE,
            deleted_cmd: 0,
        }
    }

    /// Soft-delete the version by the given writer.
    pub fn delete(&mut self, stamp: WriteStamp) {
        self.deleted_by = stamp.txn_id;
        self.deleted_cmd = stamp.command_id;
    }

    /// Determine whether the version is visible for the supplied snapshot.
    pub fn is_visible_for(&self, manager: &TxnIdManager, snapshot: TransactionSnapshot) -> bool {
        tracing::trace!(
            "[MVCC] is_visible_for: created_by={}/{}, deleted_by={}/{}, snapshot.txn_id={}, snapshot.snapshot_id={}, cmd={}",
            self.created_by,
            self.created_cmd,
            self.deleted_by,
            self.deleted_cmd,
            snapshot.txn_id,
            snapshot.snapshot_id,
            snapshot.command_id
        );

        // IMPORTANT: TXN_ID_AUTO_COMMIT is never treated as "current transaction"
        if snapshot.is_own(self.created_by) {
            if self.created_cmd >= snapshot.command_id {
                tracing::trace!("[MVCC] created by a later command of current txn, invisible");
                return false;
            }
            let visible = !(snapshot.is_own(self.deleted_by)
                && self.deleted_cmd < snapshot.command_id);
            tracing::trace!("[MVCC] created by current txn, visible={}", visible);
            return visible;
        }

        if !manager.status(self.created_by).is_committed() {
            tracing::trace!("[MVCC] creator not committed, invisible");
            return false;
        }
        if self.created_by > snapshot.snapshot_id {
            tracing::trace!("[MVCC] created_by > snapshot_id, invisible");
            return false;
        }

        match self.deleted_by {
            TXN_ID_NONE => true,
            tx if snapshot.is_own(tx) => self.deleted_cmd >= snapshot.command_id,
            tx => {
                if !manager.status(tx).is_committed() {
                    return true;
                }
                tx > snapshot.snapshot_id
            }
        }
    }

    /// Visibility ignoring command boundaries and the watermark: every committed write plus
    /// every write of the snapshot's own transaction.
    pub fn is_visible_to_self(&self, manager: &TxnIdManager, snapshot: TransactionSnapshot) -> bool {
        let created_visible = snapshot.is_own(self.created_by)
            || manager.status(self.created_by).is_committed();
        if !created_visible {
            return false;
        }
        match self.deleted_by {
            TXN_ID_NONE => true,
            tx if snapshot.is_own(tx) => false,
            tx => !manager.status(tx).is_committed(),
        }
    }
}

/// Transaction metadata captured when a transaction begins.
///
/// - `txn_id`: the transaction's own ID, used for writes
/// - `snapshot_id`: the highest committed transaction ID when the transaction started
/// - `command_id`: the current command; own writes from earlier commands are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSnapshot {
    pub txn_id: TxnId,
    pub snapshot_id: TxnId,
    pub command_id: CommandId,
}

impl TransactionSnapshot {
    /// Same transaction, positioned at `command_id`.
    pub fn at_command(self, command_id: CommandId) -> Self {
        Self { command_id, ..self }
    }

    /// Advance to the next command so writes of the current one become visible.
    pub fn next_command(self) -> Self {
        self.at_command(self.command_id + 1)
    }

    pub fn write_stamp(&self) -> WriteStamp {
        WriteStamp::new(self.txn_id, self.command_id)
    }

    #[inline]
    pub fn is_own(&self, txn_id: TxnId) -> bool {
        txn_id == self.txn_id && self.txn_id != TXN_ID_AUTO_COMMIT && txn_id != TXN_ID_NONE
    }
}

/// Transaction status values tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
    None,
}

impl TxnStatus {
    pub fn is_committed(self) -> bool {
        matches!(self, TxnStatus::Committed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, TxnStatus::Active)
    }

    pub fn is_aborted(self) -> bool {
        matches!(self, TxnStatus::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_id_manager_allocates_monotonic_ids() {
        let manager = TxnIdManager::new();
        let snapshot1 = manager.begin_transaction();
        let snapshot2 = manager.begin_transaction();
        assert!(snapshot2.txn_id > snapshot1.txn_id);
        assert_eq!(snapshot1.command_id, 0);
    }

    #[test]
    fn test_own_writes_visible_from_next_command() {
        let manager = TxnIdManager::new();
        let writer = manager.begin_transaction();
        let row = RowVersion::created(writer.write_stamp());

        assert!(!row.is_visible_for(&manager, writer));
        assert!(row.is_visible_for(&manager, writer.next_command()));
        assert!(row.is_visible_to_self(&manager, writer));
    }

    #[test]
    fn test_row_visibility_across_transactions() {
        let manager = TxnIdManager::new();
        let writer = manager.begin_transaction();
        let mut row = RowVersion::created(writer.write_stamp());

        let early_reader = manager.begin_transaction();
        assert!(!row.is_visible_for(&manager, early_reader));

        manager.mark_committed(writer.txn_id);
        let reader = manager.begin_transaction();
        assert!(row.is_visible_for(&manager, reader));

        let deleter = manager.begin_transaction();
        row.delete(deleter.write_stamp());
        assert!(row.is_visible_for(&manager, reader));
        // deleter's own view hides the row from the next command on
        assert!(row.is_visible_for(&manager, deleter));
        assert!(!row.is_visible_for(&manager, deleter.next_command()));

        manager.mark_committed(deleter.txn_id);
        assert!(row.is_visible_for(&manager, reader));
        let post_delete = manager.begin_transaction();
        assert!(!row.is_visible_for(&manager, post_delete));
    }

    #[test]
    fn test_aborted_creator_is_invisible_everywhere() {
        let manager = TxnIdManager::new();
        let writer = manager.begin_transaction();
        let row = RowVersion::created(writer.write_stamp());
        manager.mark_aborted(writer.txn_id);

        let reader = manager.begin_transaction();
        assert!(!row.is_visible_for(&manager, reader));
        assert!(!row.is_visible_to_self(&manager, reader));
    }
}
