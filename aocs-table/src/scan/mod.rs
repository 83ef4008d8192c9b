//! Scan engine.
//!
//! Every scan kind is its own struct holding only the state it needs; [`ScanDesc`] wraps
//! them for callers that drive scans generically through [`TableScan`].
//!
//! - [`SeqScan`]: all rows in locator order
//! - [`IndexFetch`]: point lookups by locator on behalf of an index
//! - [`BitmapScan`]: point lookups driven by bitmap pages of logical blocks
//! - [`SampleScan`]: rows picked by a [`SampleSource`] over logical blocks
//! - [`RangeScan`]: a range of logical blocks under [`ReadView::Any`], for index builds
//!
//! [`ReadView::Any`]: aocs_transaction::ReadView::Any

mod bitmap;
mod cursor;
mod fetch;
mod index_fetch;
mod range;
mod sample;
mod sequential;
mod target;

pub use bitmap::{BitmapScan, TbmPage, bitmap_projections};
pub use cursor::PartialScanStart;
pub use index_fetch::IndexFetch;
pub use range::RangeScan;
pub use sample::{BernoulliSampler, SampleScan, SampleSource};
pub use sequential::SeqScan;

pub(crate) use cursor::SegmentCursor;
pub(crate) use fetch::FetchDesc;
pub(crate) use target::{TargetTuple, TargetTupleMap};

use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_types::{ColumnDef, ColumnIndex, TupleSlot};

/// Columns a scan materializes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every live column.
    #[default]
    All,
    /// The listed columns.
    Some(Vec<ColumnIndex>),
    /// No particular column, e.g. `count(*)`. Resolved to the first live column so the scan
    /// still walks rows and checks visibility.
    Any,
}

impl Projection {
    /// Sorted, deduplicated column indexes. Never empty.
    pub fn resolve(&self, columns: &[ColumnDef]) -> Result<Vec<ColumnIndex>> {
        let first_live = || {
            columns
                .iter()
                .position(|c| !c.dropped)
                .ok_or_else(|| Error::Internal("table has no live column".into()))
        };
        let resolved = match self {
            Projection::All => columns
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.dropped)
                .map(|(i, _)| i)
                .collect(),
            Projection::Some(cols) => {
                let mut cols = cols.clone();
                cols.sort_unstable();
                cols.dedup();
                for &col in &cols {
                    match columns.get(col) {
                        None => {
                            return Err(Error::InvalidArgumentError(format!(
                                "projected column {col} does not exist"
                            )));
                        }
                        Some(def) if def.dropped => {
                            return Err(Error::InvalidArgumentError(format!(
                                "projected column {col} ({}) is dropped",
                                def.name
                            )));
                        }
                        Some(_) => {}
                    }
                }
                cols
            }
            Projection::Any => Vec::new(),
        };
        if resolved.is_empty() {
            return Ok(vec![first_live()?]);
        }
        Ok(resolved)
    }
}

/// Lifecycle of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Open,
    Exhausted,
    Closed,
}

/// Common driver interface of the scan kinds.
pub trait TableScan {
    /// Next row, or `None` once the scan is exhausted.
    fn next(&mut self) -> Result<Option<TupleSlot>>;

    /// Restart from the beginning with the same parameters.
    fn rescan(&mut self) -> Result<()>;

    /// Release readers. Further `next` calls return `None`.
    fn end(&mut self);

    fn state(&self) -> ScanState;

    /// Compressed bytes pulled from storage so far.
    fn total_bytes_read(&self) -> u64;
}

/// A scan of any kind.
pub enum ScanDesc<P: Pager> {
    Sequential(SeqScan<P>),
    Bitmap(BitmapScan<P>),
    Sample(SampleScan<P>),
    Range(RangeScan<P>),
}

impl<P: Pager> TableScan for ScanDesc<P> {
    fn next(&mut self) -> Result<Option<TupleSlot>> {
        match self {
            ScanDesc::Sequential(s) => s.next(),
            ScanDesc::Bitmap(s) => s.next(),
            ScanDesc::Sample(s) => s.next(),
            ScanDesc::Range(s) => s.next(),
        }
    }

    fn rescan(&mut self) -> Result<()> {
        match self {
            ScanDesc::Sequential(s) => s.rescan(),
            ScanDesc::Bitmap(s) => s.rescan(),
            ScanDesc::Sample(s) => s.rescan(),
            ScanDesc::Range(s) => s.rescan(),
        }
    }

    fn end(&mut self) {
        match self {
            ScanDesc::Sequential(s) => s.end(),
            ScanDesc::Bitmap(s) => s.end(),
            ScanDesc::Sample(s) => s.end(),
            ScanDesc::Range(s) => s.end(),
        }
    }

    fn state(&self) -> ScanState {
        match self {
            ScanDesc::Sequential(s) => s.state(),
            ScanDesc::Bitmap(s) => s.state(),
            ScanDesc::Sample(s) => s.state(),
            ScanDesc::Range(s) => s.state(),
        }
    }

    fn total_bytes_read(&self) -> u64 {
        match self {
            ScanDesc::Sequential(s) => s.total_bytes_read(),
            ScanDesc::Bitmap(s) => s.total_bytes_read(),
            ScanDesc::Sample(s) => s.total_bytes_read(),
            ScanDesc::Range(s) => s.total_bytes_read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aocs_types::ColumnType;

    fn defs() -> Vec<ColumnDef> {
        let mut dropped = ColumnDef::new("b", ColumnType::Utf8);
        dropped.dropped = true;
        vec![
            ColumnDef::new("a", ColumnType::Integer),
            dropped,
            ColumnDef::new("c", ColumnType::Float),
        ]
    }

    #[test]
    fn all_skips_dropped_columns() {
        assert_eq!(Projection::All.resolve(&defs()).unwrap(), vec![0, 2]);
    }

    #[test]
    fn any_and_empty_resolve_to_first_live_column() {
        assert_eq!(Projection::Any.resolve(&defs()).unwrap(), vec![0]);
        assert_eq!(Projection::Some(vec![]).resolve(&defs()).unwrap(), vec![0]);
    }

    #[test]
    fn some_rejects_dropped_and_unknown_columns() {
        assert_eq!(
            Projection::Some(vec![2, 0, 2]).resolve(&defs()).unwrap(),
            vec![0, 2]
        );
        assert!(Projection::Some(vec![1]).resolve(&defs()).is_err());
        assert!(Projection::Some(vec![9]).resolve(&defs()).is_err());
    }
}
