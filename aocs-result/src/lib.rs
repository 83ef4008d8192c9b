//! Error types and result definitions for the AOCS access-method crates.
//!
//! Every crate in the workspace returns [`Result<T>`], whose error variant is the single
//! [`Error`] enum defined here. Errors propagate with `?` across crate boundaries without
//! conversion layers.
//!
//! # Error Categories
//!
//! - **I/O errors** ([`Error::Io`]): pager and file access
//! - **Data format errors** ([`Error::Arrow`]): block encoding and decoding
//! - **Lookup failures** ([`Error::NotFound`]): missing blobs, segments, columns
//! - **Caller errors** ([`Error::InvalidArgumentError`], [`Error::ProgrammingError`]):
//!   bad parameters or misuse of the DML lifecycle
//! - **Unsupported surface** ([`Error::FeatureNotSupported`]): operations the column-oriented
//!   table deliberately rejects
//! - **Transaction errors** ([`Error::TransactionContextError`])
//! - **Cancellation** ([`Error::Interrupted`])
//! - **Internal errors** ([`Error::Internal`]): broken invariants

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
