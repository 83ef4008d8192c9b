use std::{fmt, io};
use thiserror::Error;

/// Unified error type for all AOCS operations.
///
/// Storage failures, caller mistakes and broken invariants all surface through this enum.
/// Callers that need to react to a specific condition (for example a rejected operation on
/// the unsupported surface) match on the variant; everything else is propagated with `?`.
///
/// # Thread Safety
///
/// `Error` implements `Send` and `Sync`, so scans running on worker threads can hand their
/// failures back to the coordinating thread.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during pager or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow error while encoding or decoding a column block.
    ///
    /// Column blocks are stored as serialized Arrow arrays, so a failure here usually means
    /// a blob was truncated or written with an unexpected layout.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Invalid caller input.
    ///
    /// Raised for rows whose arity does not match the table, projections naming columns
    /// that do not exist, out-of-range row numbers and similar.
    ///
    /// # Recovery
    ///
    /// Fix the input and retry the operation.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// Storage key or entity not found.
    ///
    /// Occurs when a physical key has no blob, or a segment or column referenced by a
    /// descriptor no longer exists.
    #[error("Storage key not found")]
    NotFound,

    /// The operation is not part of what this table kind supports.
    ///
    /// Speculative insertion, parallel scans, row-level locks and the other heap-only entry
    /// points fail with this variant. The message names the rejected operation.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),

    /// The DML lifecycle was driven in an order the caller contract forbids.
    ///
    /// Examples: starting a DML session twice for the same table, or requesting a descriptor
    /// for a table whose session was never started.
    ///
    /// # Debugging
    ///
    /// These always indicate a bug in the calling executor, never bad user data.
    #[error("programming error: {0}")]
    ProgrammingError(String),

    /// Data constraint violation.
    #[error("Constraint Error: {0}")]
    ConstraintError(String),

    /// Transaction execution or isolation error.
    #[error("{0}")]
    TransactionContextError(String),

    /// A cooperative cancellation request was observed during a long-running loop.
    #[error("operation interrupted")]
    Interrupted,

    /// Internal error indicating a bug or unexpected state.
    ///
    /// This error should never occur during normal operation. It covers corrupted block
    /// directory rows, column streams that disagree on row numbers and similar invariant
    /// breaks.
    ///
    /// # Debugging
    ///
    /// The message describes the broken invariant. Enable `RUST_LOG=debug` for the
    /// `[AOCS]`/`[BLKDIR]`/`[VISIMAP]` traces leading up to it.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create a [`Error::FeatureNotSupported`] for the named operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use aocs_result::Error;
    ///
    /// let err = Error::feature_not_supported("tuple_lock");
    /// assert!(matches!(err, Error::FeatureNotSupported(ref op) if op.contains("tuple_lock")));
    /// ```
    #[inline]
    pub fn feature_not_supported(operation: impl Into<String>) -> Self {
        Error::FeatureNotSupported(operation.into())
    }

    /// Create a [`Error::ProgrammingError`] from any displayable message.
    #[inline]
    pub fn programming<E: fmt::Display>(msg: E) -> Self {
        Error::ProgrammingError(msg.to_string())
    }

    /// Create a [`Error::Internal`] from any displayable message.
    #[inline]
    pub fn internal<E: fmt::Display>(msg: E) -> Self {
        Error::Internal(msg.to_string())
    }
}
