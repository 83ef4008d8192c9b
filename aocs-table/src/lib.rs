//! Append-only column-oriented tables.
//!
//! An [`AocsTable`] stores each column in its own append-only file per segment and never
//! rewrites a row. Deletes go to the visibility map, updates are a delete plus an insert,
//! and the block directory maps row ranges to block offsets once the table has an index.
//!
//! - [`dml`]: per-statement write sessions ([`DmlContext`])
//! - [`scan`]: sequential, index, bitmap, sample and range scans
//! - [`analyze`]: row sampling for statistics
//! - [`index_build`]: the scan that feeds an index build
//! - [`size`]: size figures for the planner

pub mod analyze;
pub mod config;
pub mod dml;
pub mod index_build;
pub mod interrupt;
pub mod scan;
pub mod size;
pub mod table;
mod unsupported;
pub mod write_hints;

pub use analyze::{RowSampler, SampleResult, acquire_sample_rows};
pub use config::AocsConfig;
pub use dml::{DmlContext, DmlSummary, UniqueCheckOutcome, UpdateOutcome};
pub use index_build::index_build_range_scan;
pub use interrupt::Interrupt;
pub use scan::{
    BernoulliSampler, BitmapScan, IndexFetch, PartialScanStart, Projection, RangeScan,
    SampleScan, SampleSource, ScanDesc, ScanState, SeqScan, TableScan, TbmPage,
};
pub use size::{
    BlockSequence, PAGE_SIZE_BYTES, RelSizeEstimate, estimate_rel_size, relation_get_block_sequence,
    relation_get_block_sequences, relation_size,
};
pub use table::AocsTable;
pub use write_hints::AocsWriteHints;
