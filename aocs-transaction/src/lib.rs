//! Transaction bookkeeping and visibility rules for the AOCS crates.
//!
//! Everything stored by the access method (column blocks, block directory rows, deletion
//! markers) carries a [`RowVersion`] naming the writing transaction and command. Readers
//! decide what they can see through a [`ReadView`], which wraps one of four visibility
//! regimes:
//!
//! - [`ReadView::Mvcc`]: regular snapshot isolation, command-aware within the own transaction
//! - [`ReadView::SelfView`]: everything committed plus every write of the own transaction
//! - [`ReadView::Dirty`]: committed plus in-progress writes, reporting in-progress writers
//! - [`ReadView::Any`]: sees everything, used by index builds that judge liveness themselves
//!
//! # Reserved Transaction IDs
//!
//! - **[`TXN_ID_NONE`] (u64::MAX)**: "no transaction" / "not deleted"
//! - **[`TXN_ID_AUTO_COMMIT`] (1)**: always committed; never treated as the current transaction
//! - **IDs 2+**: allocated by [`TxnIdManager`]
pub mod mvcc;
pub mod view;

pub use mvcc::{
    RowVersion, TXN_ID_AUTO_COMMIT, TXN_ID_NONE, TransactionSnapshot, TxnId, TxnIdManager,
    TxnStatus, WriteStamp,
};
pub use view::{DirtyView, ReadView};
