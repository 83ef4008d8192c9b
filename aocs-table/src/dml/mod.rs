//! DML sessions.
//!
//! A [`DmlContext`] belongs to one session and holds, per table, at most one insert, one
//! delete and one unique-check descriptor for the statement in flight. Executors call
//! [`DmlContext::begin`] before the first row and [`DmlContext::end`] after the last; every
//! accessor in between finds the table's state through a one-entry cache in front of the
//! table-id map.

mod insert;
mod unique;

pub use insert::InsertDesc;
pub use unique::{UniqueCheckDesc, UniqueCheckOutcome, VisibilitySource};

use aocs_directory::{DeleteOutcome, VisimapDelete};
use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_transaction::{ReadView, TransactionSnapshot};
use aocs_types::{Datum, RowLocator, TableId};
use rustc_hash::FxHashMap;

use crate::interrupt::Interrupt;
use crate::table::AocsTable;

/// Per-table state of the statement in flight.
struct DmlState<P: Pager> {
    table: AocsTable<P>,
    insert: Option<InsertDesc<P>>,
    delete: Option<VisimapDelete>,
    unique_check: Option<UniqueCheckDesc>,
}

/// What [`DmlContext::end`] flushed for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmlSummary {
    pub inserted: u64,
    pub deleted: u64,
}

/// Result of an update: the delete half's outcome and, when it succeeded, the new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub delete: DeleteOutcome,
    pub new_locator: Option<RowLocator>,
}

/// DML registry of one session.
pub struct DmlContext<P: Pager> {
    snapshot: TransactionSnapshot,
    slots: Vec<Option<DmlState<P>>>,
    free: Vec<usize>,
    index: FxHashMap<TableId, usize>,
    /// Most recently used `(table, slot)`; never owns the state.
    last_used: Option<(TableId, usize)>,
    interrupt: Interrupt,
}

impl<P: Pager> DmlContext<P> {
    pub fn new(snapshot: TransactionSnapshot) -> Self {
        Self {
            snapshot,
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            last_used: None,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        self.snapshot
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Whether any table has a statement in flight.
    pub fn is_idle(&self) -> bool {
        self.index.is_empty()
    }

    /// Move to the next command of the transaction so this statement's writes become
    /// visible to the following one.
    pub fn advance_command(&mut self) -> Result<()> {
        if !self.is_idle() {
            return Err(Error::ProgrammingError(
                "cannot advance the command while DML is in flight".into(),
            ));
        }
        self.snapshot = self.snapshot.next_command();
        Ok(())
    }

    /// Register `table` for a new statement.
    pub fn begin(&mut self, table: &AocsTable<P>) -> Result<()> {
        let table_id = table.id();
        if self.index.contains_key(&table_id) {
            return Err(Error::ProgrammingError(format!(
                "DML state for table {table_id} already exists"
            )));
        }
        let state = DmlState {
            table: table.clone(),
            insert: None,
            delete: None,
            unique_check: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(state);
                slot
            }
            None => {
                self.slots.push(Some(state));
                self.slots.len() - 1
            }
        };
        self.index.insert(table_id, slot);
        self.last_used = Some((table_id, slot));
        tracing::debug!(
            "[AOCS] dml begin table {table_id} (txn {}/{})",
            self.snapshot.txn_id,
            self.snapshot.command_id
        );
        Ok(())
    }

    /// Flush and drop every descriptor of `table_id`.
    ///
    /// The delete descriptor finishes first. It advances the table's modification count only
    /// when no insert descriptor exists, because finishing the insert advances it too and an
    /// UPDATE must count once.
    pub fn end(&mut self, table_id: TableId) -> Result<DmlSummary> {
        let slot = self.index.remove(&table_id).ok_or_else(|| {
            Error::ProgrammingError(format!("DML state for table {table_id} does not exist"))
        })?;
        if self.last_used.is_some_and(|(id, _)| id == table_id) {
            self.last_used = None;
        }
        let mut state = self.slots[slot].take().ok_or_else(|| {
            Error::Internal(format!("DML slot {slot} of table {table_id} is empty"))
        })?;
        self.free.push(slot);

        let mut summary = DmlSummary::default();
        if let Some(delete) = state.delete.take() {
            summary.deleted = delete.finish()?;
            if state.insert.is_none() {
                state.table.bump_modcount();
            }
        }
        if let Some(insert) = state.insert.take() {
            summary.inserted = insert.finish()?;
        }
        if let Some(unique_check) = state.unique_check.take() {
            unique_check.release();
        }
        tracing::debug!(
            "[AOCS] dml end table {table_id}: {} inserted, {} deleted",
            summary.inserted,
            summary.deleted
        );
        Ok(summary)
    }

    fn state_mut(&mut self, table_id: TableId) -> Result<&mut DmlState<P>> {
        let slot = match self.last_used {
            Some((id, slot)) if id == table_id => slot,
            _ => {
                let slot = *self.index.get(&table_id).ok_or_else(|| {
                    Error::ProgrammingError(format!(
                        "DML state for table {table_id} does not exist"
                    ))
                })?;
                self.last_used = Some((table_id, slot));
                slot
            }
        };
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Internal(format!("DML slot {slot} of table {table_id} is empty")))
    }

    /// Insert descriptor of `table_id`, opened on first use with `row_count_hint` rows
    /// reserved up front.
    pub fn get_or_create_insert(
        &mut self,
        table_id: TableId,
        row_count_hint: u64,
    ) -> Result<&mut InsertDesc<P>> {
        let stamp = self.snapshot.write_stamp();
        let state = self.state_mut(table_id)?;
        if state.insert.is_none() {
            state.insert = Some(InsertDesc::open(&state.table, stamp, row_count_hint)?);
        }
        state
            .insert
            .as_mut()
            .ok_or_else(|| Error::Internal("insert descriptor vanished".into()))
    }

    pub fn get_or_create_delete(&mut self, table_id: TableId) -> Result<&mut VisimapDelete> {
        let snapshot = self.snapshot;
        let state = self.state_mut(table_id)?;
        if state.delete.is_none() {
            tracing::debug!("[AOCS] table {table_id} delete desc");
            state.delete = Some(state.table.visibility_map().delete_context(snapshot));
        }
        state
            .delete
            .as_mut()
            .ok_or_else(|| Error::Internal("delete descriptor vanished".into()))
    }

    /// Unique-check descriptor of `table_id`. Created while a delete descriptor exists, it
    /// reads deletions through that descriptor.
    pub fn get_or_create_unique_check(&mut self, table_id: TableId) -> Result<&UniqueCheckDesc> {
        let state = self.state_mut(table_id)?;
        if state.unique_check.is_none() {
            let borrow = state.delete.is_some();
            state.unique_check = Some(UniqueCheckDesc::new(&state.table, borrow));
        }
        state
            .unique_check
            .as_ref()
            .ok_or_else(|| Error::Internal("unique check descriptor vanished".into()))
    }

    pub fn insert(&mut self, table_id: TableId, values: Vec<Datum>) -> Result<RowLocator> {
        self.get_or_create_insert(table_id, 0)?.insert_row(values)
    }

    /// Insert a batch. The descriptor reserves row numbers for the whole batch at once.
    pub fn multi_insert(
        &mut self,
        table_id: TableId,
        rows: Vec<Vec<Datum>>,
    ) -> Result<Vec<RowLocator>> {
        let interrupt = self.interrupt.clone();
        let count = rows.len() as u64;
        let desc = self.get_or_create_insert(table_id, count)?;
        desc.ensure_reserved(count)?;
        let mut locators = Vec::with_capacity(rows.len());
        for values in rows {
            interrupt.check()?;
            locators.push(desc.insert_row(values)?);
        }
        Ok(locators)
    }

    /// Hide `locator` from later commands and other transactions.
    ///
    /// A row deleted by another committed transaction cannot be reached here, since writers
    /// of a table are serialized; observing one is reported as an internal error.
    pub fn delete(&mut self, table_id: TableId, locator: RowLocator) -> Result<DeleteOutcome> {
        let outcome = self.get_or_create_delete(table_id)?.hide(locator);
        if let DeleteOutcome::Updated { deleted_by } = outcome {
            tracing::error!(
                "[AOCS] table {table_id}: {locator} already deleted by committed txn {deleted_by}"
            );
            return Err(Error::Internal(format!(
                "row {locator} of table {table_id} concurrently deleted by txn {deleted_by}"
            )));
        }
        Ok(outcome)
    }

    /// Delete `locator` and insert `values` as its new version.
    pub fn update(
        &mut self,
        table_id: TableId,
        locator: RowLocator,
        values: Vec<Datum>,
    ) -> Result<UpdateOutcome> {
        let delete = self.delete(table_id, locator)?;
        if delete != DeleteOutcome::Ok {
            return Ok(UpdateOutcome {
                delete,
                new_locator: None,
            });
        }
        let new_locator = self.insert(table_id, values)?;
        Ok(UpdateOutcome {
            delete,
            new_locator: Some(new_locator),
        })
    }

    /// Whether a row exists at `locator` for constraint enforcement.
    ///
    /// `view` must be a dirty or a self view.
    pub fn unique_check(
        &mut self,
        table_id: TableId,
        locator: RowLocator,
        view: &ReadView,
    ) -> Result<UniqueCheckOutcome> {
        self.get_or_create_unique_check(table_id)?;
        let state = self.state_mut(table_id)?;
        let desc = state
            .unique_check
            .as_ref()
            .ok_or_else(|| Error::Internal("unique check descriptor vanished".into()))?;
        desc.check(&state.table, state.delete.as_ref(), view, locator)
    }
}

impl<P: Pager> Drop for DmlContext<P> {
    fn drop(&mut self) {
        if !self.index.is_empty() {
            tracing::debug!(
                "[AOCS] dml context dropped with {} tables in flight",
                self.index.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AocsConfig;
    use aocs_storage::pager::MemPager;
    use aocs_transaction::TxnIdManager;
    use aocs_types::{ColumnDef, ColumnType};
    use std::sync::Arc;

    fn table(id: TableId, mgr: &TxnIdManager) -> AocsTable<MemPager> {
        AocsTable::create(
            id,
            vec![ColumnDef::new("a", ColumnType::Integer)],
            Arc::new(MemPager::new()),
            mgr.clone(),
            AocsConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn accessors_before_begin_are_programming_errors() {
        let mgr = TxnIdManager::new();
        let mut ctx: DmlContext<MemPager> = DmlContext::new(mgr.begin_transaction());
        assert!(matches!(
            ctx.get_or_create_delete(7),
            Err(Error::ProgrammingError(_))
        ));
        assert!(matches!(ctx.end(7), Err(Error::ProgrammingError(_))));
    }

    #[test]
    fn begin_twice_fails() {
        let mgr = TxnIdManager::new();
        let t = table(1, &mgr);
        let mut ctx = DmlContext::new(mgr.begin_transaction());
        ctx.begin(&t).unwrap();
        assert!(matches!(ctx.begin(&t), Err(Error::ProgrammingError(_))));
        ctx.end(1).unwrap();
        ctx.begin(&t).unwrap();
        ctx.end(1).unwrap();
    }

    #[test]
    fn slots_are_reused_across_tables() {
        let mgr = TxnIdManager::new();
        let (a, b) = (table(1, &mgr), table(2, &mgr));
        let mut ctx = DmlContext::new(mgr.begin_transaction());
        ctx.begin(&a).unwrap();
        ctx.begin(&b).unwrap();
        ctx.insert(1, vec![Datum::from(1i64)]).unwrap();
        ctx.insert(2, vec![Datum::from(2i64)]).unwrap();
        ctx.insert(1, vec![Datum::from(3i64)]).unwrap();
        assert_eq!(ctx.end(1).unwrap().inserted, 2);
        ctx.begin(&a).unwrap();
        assert_eq!(ctx.slots.len(), 2);
        assert_eq!(ctx.end(2).unwrap().inserted, 1);
        assert_eq!(ctx.end(1).unwrap(), DmlSummary::default());
        assert!(ctx.is_idle());
    }

    #[test]
    fn unique_check_borrows_an_existing_delete() {
        let mgr = TxnIdManager::new();
        let t = table(1, &mgr);
        t.register_index(true).unwrap();
        let mut ctx = DmlContext::new(mgr.begin_transaction());
        ctx.begin(&t).unwrap();
        ctx.get_or_create_delete(1).unwrap();
        assert!(ctx.get_or_create_unique_check(1).unwrap().borrows_delete());
        ctx.end(1).unwrap();

        ctx.begin(&t).unwrap();
        assert!(!ctx.get_or_create_unique_check(1).unwrap().borrows_delete());
        ctx.get_or_create_delete(1).unwrap();
        assert!(!ctx.get_or_create_unique_check(1).unwrap().borrows_delete());
        ctx.end(1).unwrap();
    }

    #[test]
    fn advance_command_requires_idle_context() {
        let mgr = TxnIdManager::new();
        let t = table(1, &mgr);
        let mut ctx = DmlContext::new(mgr.begin_transaction());
        ctx.begin(&t).unwrap();
        assert!(ctx.advance_command().is_err());
        ctx.end(1).unwrap();
        ctx.advance_command().unwrap();
        assert_eq!(ctx.snapshot().command_id, 1);
    }
}
