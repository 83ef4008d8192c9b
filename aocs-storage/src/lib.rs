//! Physical storage for append-only column-oriented tables.
//!
//! - [`pager`]: key/blob store abstraction plus the in-memory implementation
//! - [`serialization`]: the on-pager byte format of one Arrow array
//! - [`block_codec`]: conversion between cell values and Arrow arrays per column type
//! - [`segment`]: segment files, their per-column block lists, fast sequences and the
//!   column readers/writers built on top of them
//!
//! Nothing here knows about indexes, deletions or DML sessions; those live in
//! `aocs-directory` and `aocs-table`.

pub mod block_codec;
pub mod codecs;
pub mod pager;
pub mod segment;
pub mod serialization;
pub mod types;

pub use types::PhysicalKey;
