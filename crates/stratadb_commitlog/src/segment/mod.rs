//! Commit-log segments.
//!
//! A segment is one append-only file of nominal fixed size. Writer threads
//! reserve extents in the active segment; once a segment cannot fit a
//! mutation it is handed off for a fresh one and eventually discarded after
//! its contents are flushed to sstables.

mod state;

pub use state::{CdcState, CdcStateCell};

use crate::config::Config;
use crate::dir::CommitLogDir;
use crate::error::{CommitLogError, CommitLogResult};
use parking_lot::MutexGuard;
use std::path::{Path, PathBuf};
use stratadb_storage::{FileSegmentWriter, SegmentWriter, StorageError};

/// An allotted extent in a segment, promising space the caller will fill.
///
/// A reservation, once handed out, is the caller's obligation to fill or
/// waste; there is no cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// The segment the extent was reserved in.
    pub segment_id: u64,
    /// Start offset of the extent within the segment.
    pub offset: u64,
    /// Length of the extent in bytes.
    pub length: u32,
}

/// One durable append-only commit-log segment.
///
/// Segment ids ascend monotonically; across segments, ordering is defined
/// by id alone. The CDC state cell interlocks this segment with the global
/// CDC budget accounting.
pub struct Segment {
    id: u64,
    log_path: PathBuf,
    cdc_link_path: PathBuf,
    cdc_index_path: PathBuf,
    writer: Box<dyn SegmentWriter>,
    cdc: CdcStateCell,
}

impl Segment {
    pub(crate) fn new(
        id: u64,
        writer: Box<dyn SegmentWriter>,
        log_path: PathBuf,
        cdc_link_path: PathBuf,
        cdc_index_path: PathBuf,
    ) -> Self {
        Self {
            id,
            log_path,
            cdc_link_path,
            cdc_index_path,
            writer,
            cdc: CdcStateCell::new(id),
        }
    }

    /// Creates the segment file for `id` in the commit-log directory.
    ///
    /// # Errors
    ///
    /// Returns [`CommitLogError::SegmentFileCreationFailed`] if the file
    /// cannot be created.
    pub fn create(dir: &CommitLogDir, config: &Config, id: u64) -> CommitLogResult<Self> {
        let log_path = dir.segment_path(id);
        let writer = FileSegmentWriter::create(&log_path, config.segment_size_bytes()).map_err(
            |err| match err {
                StorageError::Io(source) => CommitLogError::SegmentFileCreationFailed {
                    path: log_path.clone(),
                    source,
                },
                other => CommitLogError::Storage(other),
            },
        )?;

        Ok(Self::new(
            id,
            Box::new(writer),
            log_path,
            dir.cdc_link_path(id),
            dir.cdc_index_path(id),
        ))
    }

    /// The segment's unique ascending id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path of the primary log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Path of the hard link in the CDC-raw directory.
    #[must_use]
    pub fn cdc_link_path(&self) -> &Path {
        &self.cdc_link_path
    }

    /// Path of the CDC-index sidecar in the CDC-raw directory.
    #[must_use]
    pub fn cdc_index_path(&self) -> &Path {
        &self.cdc_index_path
    }

    /// Reserves `size` bytes in this segment.
    ///
    /// Returns `None` when the segment cannot fit the request; the caller is
    /// expected to drive a hand-off and retry on the fresh segment.
    ///
    /// # Errors
    ///
    /// Propagates writer failures (fatal at the allocator level).
    pub fn allocate(&self, size: u32) -> CommitLogResult<Option<Reservation>> {
        let offset = self.writer.allocate(size)?;
        Ok(offset.map(|offset| Reservation {
            segment_id: self.id,
            offset,
            length: size,
        }))
    }

    /// Fills (part of) a previously handed-out reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation belongs to another segment or the
    /// write falls outside its extent.
    pub fn fill(&self, reservation: &Reservation, data: &[u8]) -> CommitLogResult<()> {
        if reservation.segment_id != self.id {
            return Err(CommitLogError::ReservationMismatch {
                segment_id: self.id,
                reservation_segment_id: reservation.segment_id,
            });
        }
        self.writer.write_at(reservation.offset, data)?;
        Ok(())
    }

    /// Bytes allocated in this segment so far. Grows monotonically until
    /// [`close`](Self::close).
    #[must_use]
    pub fn on_disk_size(&self) -> u64 {
        self.writer.on_disk_size()
    }

    /// Closes the underlying writer. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CommitLogResult<()> {
        self.writer.close()?;
        Ok(())
    }

    /// The segment's current CDC state, read without locking.
    #[must_use]
    pub fn cdc_state(&self) -> CdcState {
        self.cdc.get()
    }

    /// Acquires the CDC state lock of this segment, giving access to its
    /// budget-reservation flag.
    pub fn cdc_lock(&self) -> MutexGuard<'_, bool> {
        self.cdc.lock()
    }

    /// The CDC state cell, for transition bookkeeping by the size tracker.
    #[must_use]
    pub fn cdc(&self) -> &CdcStateCell {
        &self.cdc
    }

    /// Marks this segment as containing CDC data.
    ///
    /// # Errors
    ///
    /// Fails if the segment is `Forbidden`; see
    /// [`CdcStateCell::mark_contains`].
    pub fn mark_cdc_contains(&self) -> CommitLogResult<()> {
        self.cdc.mark_contains()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("log_path", &self.log_path)
            .field("cdc_state", &self.cdc.get())
            .field("on_disk_size", &self.writer.on_disk_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Segment;
    use std::path::PathBuf;
    use stratadb_storage::InMemorySegmentWriter;

    /// Builds an in-memory segment for unit tests.
    pub(crate) fn memory_segment(id: u64, capacity: u64) -> Segment {
        Segment::new(
            id,
            Box::new(InMemorySegmentWriter::new(capacity)),
            PathBuf::from(format!("CommitLog-1-{id:06}.log")),
            PathBuf::from(format!("cdc_raw/CommitLog-1-{id:06}.log")),
            PathBuf::from(format!("cdc_raw/CommitLog-1-{id:06}.cdc_idx")),
        )
    }
}
