use std::collections::VecDeque;

use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_transaction::ReadView;
use aocs_types::{ColumnIndex, LogicalBlock, RowLocator, TUPLES_PER_LOGICAL_BLOCK, TupleSlot};

use super::{FetchDesc, ScanState, TableScan};
use crate::interrupt::Interrupt;
use crate::table::AocsTable;

/// One page of a tid bitmap: a logical block and the offsets set in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbmPage {
    pub block: LogicalBlock,
    /// One-based offsets in ascending order. `None` for a lossy page, where every offset of
    /// the block is a candidate.
    pub offsets: Option<Vec<u16>>,
    /// Whether rows of this page must be rechecked against the original qual.
    pub recheck: bool,
}

impl TbmPage {
    pub fn exact(block: LogicalBlock, offsets: Vec<u16>) -> Self {
        Self {
            block,
            offsets: Some(offsets),
            recheck: false,
        }
    }

    pub fn lossy(block: LogicalBlock) -> Self {
        Self {
            block,
            offsets: None,
            recheck: true,
        }
    }
}

/// Build the two column sets of a bitmap scan.
///
/// The plain projection covers the target list and the qual; the recheck projection adds
/// the columns of the original index qual. Neither may come out empty: a fetch that reads
/// no column also skips the visibility check, so column 0 is forced in.
pub fn bitmap_projections(
    num_columns: usize,
    target_list: &[ColumnIndex],
    qual: &[ColumnIndex],
    recheck_qual: &[ColumnIndex],
) -> (Vec<ColumnIndex>, Vec<ColumnIndex>) {
    let mut proj = vec![false; num_columns];
    let mut found = false;
    for &col in target_list.iter().chain(qual) {
        if let Some(slot) = proj.get_mut(col) {
            *slot = true;
            found = true;
        }
    }
    let mut proj_recheck = proj.clone();
    let mut recheck_found = false;
    for &col in recheck_qual {
        if let Some(slot) = proj_recheck.get_mut(col) {
            *slot = true;
            recheck_found = true;
        }
    }
    if num_columns > 0 {
        if recheck_found && !found {
            proj[0] = true;
        } else if !found {
            proj[0] = true;
            proj_recheck[0] = true;
        }
    }
    let indexes = |mask: Vec<bool>| {
        mask.into_iter()
            .enumerate()
            .filter_map(|(i, on)| on.then_some(i))
            .collect()
    };
    (indexes(proj), indexes(proj_recheck))
}

/// Fetches the rows named by bitmap pages.
///
/// Rows of pages that need a recheck are read through a second fetch descriptor with its
/// own, wider projection. Each descriptor is created the first time a page needs it.
pub struct BitmapScan<P: Pager> {
    table: AocsTable<P>,
    view: ReadView,
    projection: Vec<ColumnIndex>,
    projection_recheck: Vec<ColumnIndex>,
    fetch: Option<FetchDesc<P>>,
    fetch_recheck: Option<FetchDesc<P>>,
    pages: VecDeque<TbmPage>,
    page: Option<TbmPage>,
    /// Position inside the current page, kept between `next_tuple` calls.
    cindex: usize,
    state: ScanState,
    interrupt: Interrupt,
}

impl<P: Pager> BitmapScan<P> {
    pub fn begin(
        table: &AocsTable<P>,
        view: ReadView,
        target_list: &[ColumnIndex],
        qual: &[ColumnIndex],
        recheck_qual: &[ColumnIndex],
        interrupt: Interrupt,
    ) -> Self {
        let (projection, projection_recheck) =
            bitmap_projections(table.num_columns(), target_list, qual, recheck_qual);
        tracing::debug!(
            "[AOCS] table {} bitmap scan open: columns {projection:?}, recheck columns {projection_recheck:?}",
            table.id()
        );
        Self {
            table: table.clone(),
            view,
            projection,
            projection_recheck,
            fetch: None,
            fetch_recheck: None,
            pages: VecDeque::new(),
            page: None,
            cindex: 0,
            state: ScanState::Open,
            interrupt,
        }
    }

    pub fn projection(&self) -> &[ColumnIndex] {
        &self.projection
    }

    pub fn projection_recheck(&self) -> &[ColumnIndex] {
        &self.projection_recheck
    }

    /// Queue pages for [`TableScan::next`].
    pub fn push_pages(&mut self, pages: impl IntoIterator<Item = TbmPage>) {
        self.pages.extend(pages);
    }

    /// Make `page` the current page. Returns `false` for a page with no offsets.
    pub fn next_block(&mut self, page: TbmPage) -> bool {
        let has_rows = page.offsets.as_ref().is_none_or(|o| !o.is_empty());
        tracing::trace!(
            "[AOCS] bitmap block {} ({} offsets, recheck {})",
            page.block,
            page.offsets.as_ref().map_or(TUPLES_PER_LOGICAL_BLOCK as usize, Vec::len),
            page.recheck
        );
        self.page = Some(page);
        self.cindex = 0;
        has_rows
    }

    fn fetch_desc(&mut self, recheck: bool) -> &mut FetchDesc<P> {
        let (slot, projection) = if recheck {
            (&mut self.fetch_recheck, &self.projection_recheck)
        } else {
            (&mut self.fetch, &self.projection)
        };
        slot.get_or_insert_with(|| FetchDesc::open(&self.table, &self.view, projection.clone()))
    }

    /// Next visible row of the current page, or `None` once the page is done.
    pub fn next_tuple(&mut self) -> Result<Option<TupleSlot>> {
        loop {
            self.interrupt.check()?;
            let Some(page) = self.page.as_ref() else {
                return Ok(None);
            };
            let offset = match &page.offsets {
                None if (self.cindex as u64) < TUPLES_PER_LOGICAL_BLOCK => (self.cindex + 1) as u16,
                Some(offsets) if self.cindex < offsets.len() => offsets[self.cindex],
                _ => return Ok(None),
            };
            let (block, recheck) = (page.block, page.recheck);
            self.cindex += 1;
            let Some(locator) = RowLocator::from_block_offset(block, offset) else {
                continue;
            };
            if let Some(slot) = self.fetch_desc(recheck).fetch(locator)? {
                return Ok(Some(slot));
            }
        }
    }
}

impl<P: Pager> TableScan for BitmapScan<P> {
    fn next(&mut self) -> Result<Option<TupleSlot>> {
        if self.state != ScanState::Open {
            return Ok(None);
        }
        loop {
            if let Some(slot) = self.next_tuple()? {
                return Ok(Some(slot));
            }
            match self.pages.pop_front() {
                Some(page) => {
                    self.next_block(page);
                }
                None => {
                    self.page = None;
                    self.state = ScanState::Exhausted;
                    return Ok(None);
                }
            }
        }
    }

    /// Drops the queued pages; the fetch descriptors stay for the next round.
    fn rescan(&mut self) -> Result<()> {
        self.pages.clear();
        self.page = None;
        self.cindex = 0;
        if self.state != ScanState::Closed {
            self.state = ScanState::Open;
        }
        Ok(())
    }

    fn end(&mut self) {
        self.pages.clear();
        self.page = None;
        self.fetch = None;
        self.fetch_recheck = None;
        self.state = ScanState::Closed;
    }

    fn state(&self) -> ScanState {
        self.state
    }

    fn total_bytes_read(&self) -> u64 {
        self.fetch.as_ref().map_or(0, FetchDesc::bytes_read)
            + self.fetch_recheck.as_ref().map_or(0, FetchDesc::bytes_read)
    }
}
