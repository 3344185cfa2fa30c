//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during segment writer operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to write outside an allocated extent.
    #[error("write beyond allocated extent: offset {offset}, len {len}, allocated {allocated}")]
    WriteOutOfBounds {
        /// The requested write offset.
        offset: u64,
        /// The requested write length.
        len: usize,
        /// The current allocation watermark.
        allocated: u64,
    },

    /// The writer is closed.
    #[error("segment writer is closed")]
    Closed,
}
