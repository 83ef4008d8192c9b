//! AOCS: append-only column-oriented table storage.
//!
//! This crate is the entrypoint for the AOCS access method. It re-exports the table API
//! and the storage, transaction and directory types from the underlying `aocs-*` crates.
//!
//! # Quick Start
//!
//! Create an in-memory table, insert a row and scan it back:
//!
//! ```rust
//! use std::sync::Arc;
//! use aocs::{
//!     AocsConfig, AocsTable, ColumnDef, ColumnType, Datum, DmlContext, Interrupt, MemPager,
//!     Projection, ReadView, SeqScan, TableScan, TxnIdManager,
//! };
//!
//! let mgr = TxnIdManager::new();
//! let table = AocsTable::create(
//!     1,
//!     vec![ColumnDef::new("id", ColumnType::Integer)],
//!     Arc::new(MemPager::new()),
//!     mgr.clone(),
//!     AocsConfig::default(),
//! )
//! .unwrap();
//!
//! let txn = mgr.begin_transaction();
//! let mut ctx = DmlContext::new(txn);
//! ctx.begin(&table).unwrap();
//! ctx.insert(1, vec![Datum::Integer(42)]).unwrap();
//! ctx.end(1).unwrap();
//! mgr.mark_committed(txn.txn_id);
//!
//! let view = ReadView::Mvcc(mgr.latest_snapshot());
//! let mut scan = SeqScan::begin(&table, view, &Projection::All, Interrupt::new()).unwrap();
//! let slot = scan.next().unwrap().unwrap();
//! assert_eq!(slot.values, vec![Datum::Integer(42)]);
//! ```
//!
//! # Architecture
//!
//! - **Table** (`aocs-table`): DML sessions, scans, sampling, index-build scans and sizing.
//! - **Directory** (`aocs-directory`): block directory and visibility map.
//! - **Storage** (`aocs-storage`): pager, block codec and segment files.
//! - **Transactions** (`aocs-transaction`): transaction ids, snapshots and read views.
//! - **Types** (`aocs-types`): row locators, logical block arithmetic and cell values.

pub use aocs_table::*;

pub mod storage {
    //! Storage layer abstractions and pager implementations.

    pub use aocs_storage::pager::{MemPager, Pager};
    pub use aocs_storage::segment::{SegmentState, SegmentTotals};
}

pub use aocs_directory::{BlockDirectory, DeleteOutcome, VisibilityMap};
pub use aocs_result::{Error, Result};
pub use aocs_storage::pager::MemPager;
pub use aocs_transaction::{ReadView, TransactionSnapshot, TxnId, TxnIdManager};
pub use aocs_types::{
    ColumnDef, ColumnIndex, ColumnType, Datum, LogicalBlock, RowLocator, SegmentNo, TableId,
    TupleSlot,
};
