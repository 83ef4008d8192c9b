//! Identifiers and value types shared across the AOCS crates.
//!
//! Nothing in here touches storage. The row locator layout and the logical block
//! arithmetic live in [`ids`]; [`datum`] holds the in-memory cell values that flow
//! through inserts and scans; [`slot`] is the tuple slot handed back by every scan.

pub mod datum;
pub mod ids;
pub mod slot;

pub use datum::{ColumnDef, ColumnType, Datum};
pub use ids::{
    ColumnIndex, CommandId, LogicalBlock, MAX_ROW_NUMBER, ROW_NUMBER_BITS, RowLocator, RowNumber,
    SegmentNo, TUPLES_PER_LOGICAL_BLOCK, TableId,
};
pub use slot::TupleSlot;
