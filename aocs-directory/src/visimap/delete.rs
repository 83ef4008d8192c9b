use std::collections::BTreeMap;

use aocs_result::Result;
use aocs_transaction::{ReadView, RowVersion, TransactionSnapshot, TxnId};
use aocs_types::{CommandId, RowLocator, SegmentNo};
use roaring::RoaringTreemap;

use super::{DeleteSet, VisibilityMap};

/// Result of hiding one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row is now hidden.
    Ok,
    /// Already hidden by the current command of this transaction.
    SelfModified { cmax: CommandId },
    /// Already hidden by an earlier command of this transaction.
    Invisible,
    /// Hidden by another committed transaction.
    Updated { deleted_by: TxnId },
}

/// Deletes of one statement, buffered until [`finish`](Self::finish) publishes them.
///
/// The pending rows double as the visibility source of a unique check running inside the
/// same UPDATE, which must see the statement's own deletes before they are published.
#[derive(Debug)]
pub struct VisimapDelete {
    map: VisibilityMap,
    snapshot: TransactionSnapshot,
    pending: BTreeMap<SegmentNo, RoaringTreemap>,
}

impl VisimapDelete {
    pub(super) fn new(map: VisibilityMap, snapshot: TransactionSnapshot) -> Self {
        Self {
            map,
            snapshot,
            pending: BTreeMap::new(),
        }
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        self.snapshot
    }

    fn is_pending(&self, locator: RowLocator) -> bool {
        self.pending
            .get(&locator.segno())
            .is_some_and(|rows| rows.contains(locator.row_number()))
    }

    /// Hide `locator`.
    pub fn hide(&mut self, locator: RowLocator) -> DeleteOutcome {
        if self.is_pending(locator) {
            return DeleteOutcome::SelfModified {
                cmax: self.snapshot.command_id,
            };
        }
        if let Some(deleter) = self.map.deleter_of(locator) {
            let outcome = self.classify_existing(deleter);
            if outcome != DeleteOutcome::Ok {
                tracing::trace!("[VISIMAP] hide {locator}: {outcome:?}");
                return outcome;
            }
        }
        self.pending
            .entry(locator.segno())
            .or_default()
            .insert(locator.row_number());
        tracing::trace!("[VISIMAP] hide {locator}: ok");
        DeleteOutcome::Ok
    }

    fn classify_existing(&self, deleter: RowVersion) -> DeleteOutcome {
        if self.snapshot.is_own(deleter.created_by) {
            return if deleter.created_cmd >= self.snapshot.command_id {
                DeleteOutcome::SelfModified {
                    cmax: deleter.created_cmd,
                }
            } else {
                DeleteOutcome::Invisible
            };
        }
        if self
            .map
            .txn_manager()
            .status(deleter.created_by)
            .is_committed()
        {
            return DeleteOutcome::Updated {
                deleted_by: deleter.created_by,
            };
        }
        DeleteOutcome::Ok
    }

    /// Visibility including this statement's unpublished deletes, judged under the
    /// statement's own transaction.
    pub fn is_visible(&self, locator: RowLocator) -> bool {
        if self.is_pending(locator) {
            return false;
        }
        self.map
            .is_visible(&ReadView::SelfView(self.snapshot), locator)
    }

    pub fn pending_count(&self) -> u64 {
        self.pending.values().map(RoaringTreemap::len).sum()
    }

    /// Publish the buffered deletes. Returns the number of rows hidden.
    pub fn finish(self) -> Result<u64> {
        let version = RowVersion::created(self.snapshot.write_stamp());
        let mut total = 0;
        for (segno, rows) in self.pending {
            total += rows.len();
            self.map.publish(segno, DeleteSet { version, rows });
        }
        tracing::debug!(
            "[VISIMAP] delete by txn {}/{} finished: {total} rows",
            self.snapshot.txn_id,
            self.snapshot.command_id
        );
        Ok(total)
    }
}
