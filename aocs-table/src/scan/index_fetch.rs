use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_transaction::ReadView;
use aocs_types::{ColumnIndex, RowLocator, TupleSlot};

use super::{FetchDesc, Projection};
use crate::table::AocsTable;

/// Existence check for index-only scans: the block directory plus the visibility map, no
/// column data.
struct IndexOnlyDesc {
    column: ColumnIndex,
    meta_view: ReadView,
}

/// Point lookups on behalf of an index scan.
///
/// The fetch descriptor behind it is expensive to set up, so it is created on the first
/// lookup and kept across [`fetch_reset`](Self::fetch_reset) calls until
/// [`fetch_end`](Self::fetch_end).
pub struct IndexFetch<P: Pager> {
    table: AocsTable<P>,
    view: ReadView,
    projection: Projection,
    fetch: Option<FetchDesc<P>>,
    index_only: Option<IndexOnlyDesc>,
}

impl<P: Pager> IndexFetch<P> {
    pub fn begin(table: &AocsTable<P>, view: ReadView) -> Self {
        Self::with_projection(table, view, Projection::All)
    }

    pub fn with_projection(table: &AocsTable<P>, view: ReadView, projection: Projection) -> Self {
        Self {
            table: table.clone(),
            view,
            projection,
            fetch: None,
            index_only: None,
        }
    }

    /// Row at `locator` if it exists and is visible.
    pub fn fetch_tuple(&mut self, locator: RowLocator) -> Result<Option<TupleSlot>> {
        if self.fetch.is_none() {
            let projection = self.projection.resolve(&self.table.columns())?;
            self.fetch = Some(FetchDesc::open(&self.table, &self.view, projection));
        }
        match self.fetch.as_mut() {
            Some(fetch) => fetch.fetch(locator),
            None => Ok(None),
        }
    }

    /// Called between index sub-scans of one statement. Keeps the fetch descriptor.
    pub fn fetch_reset(&mut self) {}

    /// Whether a visible row exists at `locator`, without reading column data.
    pub fn tuple_visible(&mut self, locator: RowLocator) -> Result<bool> {
        if !self.table.has_block_directory() {
            return Err(Error::ProgrammingError(format!(
                "index-only visibility check on table {} without a block directory",
                self.table.id()
            )));
        }
        if self.index_only.is_none() {
            self.index_only = Some(IndexOnlyDesc {
                column: self.table.first_non_dropped_column()?,
                meta_view: self.table.metadata_view(&self.view),
            });
        }
        let Some(desc) = self.index_only.as_ref() else {
            return Ok(false);
        };
        let covered = self.table.block_directory().covers_row(
            &desc.meta_view,
            locator.segno(),
            desc.column,
            locator.row_number(),
        );
        Ok(covered && self.table.visibility_map().is_visible(&self.view, locator))
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.fetch.as_ref().map_or(0, FetchDesc::bytes_read)
    }

    /// Release the fetch descriptors.
    pub fn fetch_end(&mut self) {
        let had_fetch = self.fetch.take().is_some();
        let had_index_only = self.index_only.take().is_some();
        if had_fetch || had_index_only {
            tracing::debug!("[AOCS] table {} index fetch closed", self.table.id());
        }
    }
}
