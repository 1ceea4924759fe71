//! # Error Types
//!
//! Errors raised while producing or consuming key/value entry streams.

use thiserror::Error;

/// Errors from `KVEntry` construction and `KVEntryReader` implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVEntryError {
    /// Entry keys must be non-empty strings.
    #[error("KVEntry key must not be empty")]
    EmptyKey,

    /// `read` was called again after the end of the stream was reported.
    #[error("read past the end of the KVEntry stream")]
    ReadPastEnd,

    /// `read` was called after `close`.
    #[error("KVEntry reader is closed")]
    Closed,

    /// A line of line-delimited export data could not be decoded.
    #[error("invalid export data at line {line}: {message}")]
    Decode { line: usize, message: String },

    /// An entry could not be encoded.
    #[error("failed to encode KVEntry: {0}")]
    Encode(String),

    /// A source item could not be converted into an entry.
    #[error("invalid KVEntry source item: {0}")]
    Conversion(String),

    /// The backing ordered-store iterator failed.
    #[error("store iterator error: {0}")]
    Iterator(String),

    /// A hook callback rejected an entry or failed on close.
    #[error("KVEntry hook failed: {0}")]
    Hook(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for KVEntryError {
    fn from(err: std::io::Error) -> Self {
        KVEntryError::Io(err.to_string())
    }
}
