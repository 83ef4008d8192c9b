//! Auxiliary structures of an append-only column-oriented table.
//!
//! - [`block_directory`]: maps `(segment, column, row range)` to the file offset of the
//!   block holding those rows. Needed for point lookups and for positioning partial scans.
//!   Also answers "does this row exist", which is what unique-constraint checks ask.
//! - [`visimap`]: records deleted rows. Column files are immutable, so a delete only ever
//!   adds a marker here.
//!
//! Both structures are shared by every session working on the table and are versioned with
//! the writing transaction, so readers evaluate them under their own read view.

pub mod block_directory;
pub mod visimap;

pub use block_directory::{
    BlockDirectory, BlockDirectoryWriter, DirectoryEntry, EntryKind, MinipageRow,
};
pub use visimap::{DeleteOutcome, DeleteSet, VisibilityMap, VisimapDelete};
