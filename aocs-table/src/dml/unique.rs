use aocs_directory::{BlockDirectory, VisibilityMap, VisimapDelete};
use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_transaction::{ReadView, TxnId};
use aocs_types::RowLocator;

use crate::table::AocsTable;

/// Answer of a uniqueness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueCheckOutcome {
    NotFound,
    Found,
    /// A row exists but an in-progress transaction created or deleted it. The caller waits
    /// for that transaction and probes again.
    FoundContended {
        xmin: Option<TxnId>,
        xmax: Option<TxnId>,
    },
}

impl UniqueCheckOutcome {
    pub fn is_found(self) -> bool {
        !matches!(self, UniqueCheckOutcome::NotFound)
    }
}

/// Where a unique check looks up deletions.
///
/// Inside an UPDATE the statement's own deletes are still pending in the delete descriptor,
/// so the check reads through that record instead of the published map.
#[derive(Debug)]
pub enum VisibilitySource {
    Owned(VisibilityMap),
    BorrowedFromDelete,
}

/// Handles a statement uses to answer uniqueness probes on one table.
#[derive(Debug)]
pub struct UniqueCheckDesc {
    directory: BlockDirectory,
    source: VisibilitySource,
}

impl UniqueCheckDesc {
    pub(crate) fn new<P: Pager>(table: &AocsTable<P>, borrow_delete: bool) -> Self {
        let source = if borrow_delete {
            VisibilitySource::BorrowedFromDelete
        } else {
            VisibilitySource::Owned(table.visibility_map().clone())
        };
        tracing::debug!(
            "[AOCS] table {} unique check desc ({})",
            table.id(),
            if borrow_delete { "borrowed visimap" } else { "own visimap" }
        );
        Self {
            directory: table.block_directory().clone(),
            source,
        }
    }

    pub fn borrows_delete(&self) -> bool {
        matches!(self.source, VisibilitySource::BorrowedFromDelete)
    }

    /// Release the descriptor: the directory handle, and the visibility handle only when
    /// it is owned. A borrowed one belongs to the delete descriptor.
    pub(crate) fn release(self) {
        drop(self.directory);
        match self.source {
            VisibilitySource::Owned(map) => drop(map),
            VisibilitySource::BorrowedFromDelete => {}
        }
    }

    pub(crate) fn check<P: Pager>(
        &self,
        table: &AocsTable<P>,
        delete: Option<&VisimapDelete>,
        view: &ReadView,
        locator: RowLocator,
    ) -> Result<UniqueCheckOutcome> {
        // A self view is only used by concurrent unique index builds. The writer's
        // placeholder may not be visible to it when it belongs to another in-memory write
        // buffer, so this answer assumes no such buffer exists.
        if view.is_self() {
            return Ok(UniqueCheckOutcome::Found);
        }
        let Some(dirty) = view.as_dirty() else {
            return Err(Error::ProgrammingError(
                "unique check needs a dirty or self read view".into(),
            ));
        };
        if !table.has_block_directory() {
            return Err(Error::ProgrammingError(format!(
                "unique check on table {} without a block directory",
                table.id()
            )));
        }

        let column = table.first_non_dropped_column()?;
        if !self
            .directory
            .covers_row(view, locator.segno(), column, locator.row_number())
        {
            tracing::trace!("[AOCS] unique check {locator}: not covered");
            return Ok(UniqueCheckOutcome::NotFound);
        }
        if dirty.xmin().is_some() || dirty.xmax().is_some() {
            let outcome = UniqueCheckOutcome::FoundContended {
                xmin: dirty.xmin(),
                xmax: dirty.xmax(),
            };
            tracing::trace!("[AOCS] unique check {locator}: {outcome:?}");
            return Ok(outcome);
        }

        let visible = match &self.source {
            VisibilitySource::Owned(map) => map.is_visible(view, locator),
            VisibilitySource::BorrowedFromDelete => delete
                .ok_or_else(|| {
                    Error::Internal("unique check borrowed a delete descriptor that is gone".into())
                })?
                .is_visible(locator),
        };
        tracing::trace!("[AOCS] unique check {locator}: visible={visible}");
        Ok(match (visible, dirty.xmax()) {
            (true, Some(deleter)) => UniqueCheckOutcome::FoundContended {
                xmin: None,
                xmax: Some(deleter),
            },
            (true, None) => UniqueCheckOutcome::Found,
            (false, _) => UniqueCheckOutcome::NotFound,
        })
    }
}
