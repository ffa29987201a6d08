//! Error handling for sable operations.
//!
//! All public APIs return `Result<T, IndexError>`. Outcomes that are part of
//! the index contract (duplicate insert, missing key) are expressed as data
//! (`Ok(false)`, `None`, empty result vectors), never as errors; the error
//! type is reserved for I/O failures, file-format damage, and caller
//! mistakes.

use std::io;
use thiserror::Error;

/// Result type for sable operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while operating on an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file is damaged: bad magic, checksum mismatch, truncated
    /// record, or an offset pointing outside the file.
    ///
    /// The index refuses to operate on data it cannot trust; there is no
    /// silent-repair path.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Invalid configuration or usage: mismatched value length, an index
    /// file already locked by another process, geometry that does not match
    /// the opened file.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
