//! Table-access operations this storage kind rejects.
//!
//! Rows are never updated or locked in place and have no per-row version header, so
//! anything that needs one fails loudly instead of degrading.

use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_transaction::{ReadView, TxnId};
use aocs_types::{Datum, RowLocator, TupleSlot};

use crate::table::AocsTable;

fn not_supported(op: &str) -> Error {
    Error::FeatureNotSupported(format!(
        "{op} is not supported for append-only column-oriented tables"
    ))
}

impl<P: Pager> AocsTable<P> {
    pub fn tuple_insert_speculative(&self, _values: &[Datum], _token: u32) -> Result<RowLocator> {
        Err(not_supported("speculative insert"))
    }

    pub fn tuple_complete_speculative(&self, _locator: RowLocator, _succeeded: bool) -> Result<()> {
        Err(not_supported("speculative insert"))
    }

    pub fn tuple_lock(&self, _locator: RowLocator) -> Result<()> {
        Err(not_supported("row locking"))
    }

    pub fn fetch_row_version(&self, _locator: RowLocator, _view: &ReadView) -> Result<TupleSlot> {
        Err(not_supported("fetching a row version by locator"))
    }

    pub fn get_latest_tid(&self, _locator: RowLocator) -> Result<RowLocator> {
        Err(not_supported("following an update chain"))
    }

    pub fn tuple_tid_valid(&self, _locator: RowLocator) -> Result<bool> {
        Err(not_supported("locator validity checks"))
    }

    pub fn tuple_satisfies_snapshot(&self, _locator: RowLocator, _view: &ReadView) -> Result<bool> {
        Err(not_supported("visibility checks against an arbitrary snapshot"))
    }

    pub fn compute_xid_horizon_for_tuples(&self, _locators: &[RowLocator]) -> Result<TxnId> {
        Err(not_supported("computing a transaction horizon for rows"))
    }

    pub fn parallelscan_estimate(&self) -> Result<usize> {
        Err(Error::FeatureNotSupported(
            "parallel SeqScan not implemented for AO_COLUMN tables".into(),
        ))
    }

    pub fn parallelscan_initialize(&self) -> Result<usize> {
        Err(Error::FeatureNotSupported(
            "parallel SeqScan not implemented for AO_COLUMN tables".into(),
        ))
    }

    pub fn parallelscan_reinitialize(&self) -> Result<()> {
        Err(Error::FeatureNotSupported(
            "parallel SeqScan not implemented for AO_COLUMN tables".into(),
        ))
    }

    pub fn index_validate_scan(&self) -> Result<()> {
        Err(Error::FeatureNotSupported(
            "index validate scan not implemented yet for AO_COLUMN tables".into(),
        ))
    }

    /// Sampling goes through [`acquire_sample_rows`](crate::analyze::acquire_sample_rows).
    pub fn scan_analyze_next_block(&self) -> Result<bool> {
        Err(Error::Internal(
            "API not supported for appendoptimized relations".into(),
        ))
    }

    pub fn scan_analyze_next_tuple(&self) -> Result<Option<TupleSlot>> {
        Err(Error::Internal(
            "API not supported for appendoptimized relations".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aocs_storage::pager::MemPager;
    use aocs_transaction::TxnIdManager;
    use aocs_types::{ColumnDef, ColumnType};

    use super::*;
    use crate::config::AocsConfig;

    fn table() -> AocsTable<MemPager> {
        AocsTable::create(
            1,
            vec![ColumnDef::new("a", ColumnType::Integer)],
            Arc::new(MemPager::new()),
            TxnIdManager::new(),
            AocsConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn row_level_operations_fault() {
        let t = table();
        let loc = RowLocator::from_parts(1, 0);
        assert!(matches!(t.tuple_lock(loc), Err(Error::FeatureNotSupported(_))));
        assert!(matches!(
            t.fetch_row_version(loc, &ReadView::Any),
            Err(Error::FeatureNotSupported(_))
        ));
        assert!(matches!(t.get_latest_tid(loc), Err(Error::FeatureNotSupported(_))));
        assert!(matches!(t.tuple_tid_valid(loc), Err(Error::FeatureNotSupported(_))));
        assert!(matches!(
            t.tuple_satisfies_snapshot(loc, &ReadView::Any),
            Err(Error::FeatureNotSupported(_))
        ));
        assert!(matches!(
            t.tuple_insert_speculative(&[Datum::Integer(1)], 0),
            Err(Error::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn parallel_scan_and_analyze_hooks_fault() {
        let t = table();
        assert!(matches!(t.parallelscan_estimate(), Err(Error::FeatureNotSupported(_))));
        assert!(matches!(t.index_validate_scan(), Err(Error::FeatureNotSupported(_))));
        assert!(matches!(t.scan_analyze_next_block(), Err(Error::Internal(_))));
    }
}
