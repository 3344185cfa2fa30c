//! Error types for the commit log.

use crate::segment::CdcState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for commit-log operations.
pub type CommitLogResult<T> = Result<T, CommitLogError>;

/// Errors that can occur in commit-log operations.
#[derive(Debug, Error)]
pub enum CommitLogError {
    /// A CDC-tracked mutation was rejected because the CDC budget is
    /// exhausted.
    ///
    /// This error is soft: the write is not durable, and the client may
    /// retry once the CDC consumer has freed space.
    #[error(
        "rejecting mutation to keyspace {keyspace}; free up space in {cdc_directory:?} by processing CDC logs"
    )]
    CdcWriteRejected {
        /// The keyspace the rejected mutation targeted.
        keyspace: String,
        /// The CDC-raw directory the consumer must drain.
        cdc_directory: PathBuf,
    },

    /// Segment writer error.
    #[error("storage error: {0}")]
    Storage(#[from] stratadb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A CDC state transition that the state machine forbids.
    ///
    /// `CONTAINS` is terminal, and a `FORBIDDEN` segment can never have
    /// admitted CDC data; either transition indicates an admission bug.
    #[error("invalid CDC state transition {from:?} -> {to:?} on segment {segment_id}")]
    InvalidCdcTransition {
        /// The segment on which the transition was attempted.
        segment_id: u64,
        /// State before the attempted transition.
        from: CdcState,
        /// Requested target state.
        to: CdcState,
    },

    /// Hard-linking a segment into the CDC-raw directory failed.
    ///
    /// Fatal at segment creation: the node cannot honor the CDC contract,
    /// and the segment must not become active.
    #[error("failed to create CDC link {path:?} for segment {segment_id}: {source}")]
    CdcLinkCreationFailed {
        /// The segment being linked.
        segment_id: u64,
        /// The link path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Creating a segment file on disk failed.
    #[error("segment file creation failed: {path:?}: {source}")]
    SegmentFileCreationFailed {
        /// Path that failed to create.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// A reservation was presented to a segment it does not belong to.
    #[error("reservation for segment {reservation_segment_id} presented to segment {segment_id}")]
    ReservationMismatch {
        /// The segment asked to fill the reservation.
        segment_id: u64,
        /// The segment the reservation was taken in.
        reservation_segment_id: u64,
    },

    /// Another process holds the commit-log directory lock.
    #[error("commit-log directory locked: another process has exclusive access")]
    DirectoryLocked,
}

impl CommitLogError {
    /// Creates a CDC write rejection error.
    pub fn cdc_write_rejected(keyspace: impl Into<String>, cdc_directory: impl Into<PathBuf>) -> Self {
        Self::CdcWriteRejected {
            keyspace: keyspace.into(),
            cdc_directory: cdc_directory.into(),
        }
    }

    /// Creates an invalid CDC transition error.
    pub fn invalid_cdc_transition(segment_id: u64, from: CdcState, to: CdcState) -> Self {
        Self::InvalidCdcTransition {
            segment_id,
            from,
            to,
        }
    }

    /// Returns `true` for the soft admission-rejection error.
    #[must_use]
    pub fn is_cdc_rejection(&self) -> bool {
        matches!(self, Self::CdcWriteRejected { .. })
    }
}
