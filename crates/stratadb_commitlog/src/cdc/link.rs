//! Hard-link maintenance in the CDC-raw directory.

use crate::dir::CommitLogDir;
use crate::error::{CommitLogError, CommitLogResult};
use crate::segment::Segment;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Maintains the hard links that expose segments to the CDC consumer.
///
/// Each segment is linked (not copied) into the CDC-raw directory at
/// creation, so the consumer observes the file growing in real time while
/// the primary commit log keeps writing. Segments that never admitted CDC
/// data lose their link at discard; segments that did keep it until the
/// consumer is done.
#[derive(Debug)]
pub struct CdcLinkManager {
    dir: Arc<CommitLogDir>,
}

impl CdcLinkManager {
    /// Creates a link manager over the given directory layout.
    #[must_use]
    pub fn new(dir: Arc<CommitLogDir>) -> Self {
        Self { dir }
    }

    /// Hard-links the segment's log file into the CDC-raw directory.
    ///
    /// # Errors
    ///
    /// Returns [`CommitLogError::CdcLinkCreationFailed`]. This is fatal at
    /// segment creation: a segment whose link cannot be created must not be
    /// exposed as active.
    pub fn create_link(&self, segment: &Segment) -> CommitLogResult<()> {
        fs::hard_link(segment.log_path(), segment.cdc_link_path()).map_err(|source| {
            CommitLogError::CdcLinkCreationFailed {
                segment_id: segment.id(),
                path: segment.cdc_link_path().to_path_buf(),
                source,
            }
        })
    }

    /// Removes the segment's CDC link and index sidecar, tolerating files
    /// that are already absent.
    ///
    /// # Errors
    ///
    /// Returns the first deletion failure other than absence. Callers on the
    /// discard path log and continue; orphans are reaped at next replay.
    pub fn remove_link(&self, segment: &Segment) -> CommitLogResult<()> {
        remove_if_present(segment.cdc_link_path())?;
        remove_if_present(segment.cdc_index_path())?;
        Ok(())
    }

    /// Replay-time cleanup for a historical segment file name: if the CDC
    /// link exists but its index sidecar does not, the link is garbage from
    /// an unfinished producer and is deleted.
    ///
    /// Returns `true` if an orphaned link was deleted.
    ///
    /// # Errors
    ///
    /// Propagates deletion failures.
    pub fn remove_orphan(&self, file_name: &str) -> CommitLogResult<bool> {
        let link = self.dir.cdc_link_for(file_name);
        let index = self.dir.cdc_index_for(file_name);

        if link.exists() && !index.exists() {
            trace!(file = file_name, "deleting unneeded CDC segment link");
            fs::remove_file(&link)?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
