//! Segment allocator selection.
//!
//! Nodes with CDC disabled use [`StandardAllocator`], which knows nothing
//! about hard links or budgets; nodes with CDC enabled use
//! [`CdcAllocator`]. Both share the allocate-or-switch loop shape.

use crate::cdc::CdcAllocator;
use crate::config::Config;
use crate::dir::CommitLogDir;
use crate::error::CommitLogResult;
use crate::manager::{SegmentFactory, SegmentManager, SegmentSource};
use crate::mutation::Mutation;
use crate::segment::{Reservation, Segment};
use std::fs;
use std::sync::Arc;

/// The commit log's segment allocation capability.
///
/// One implementation exists per node, selected by `cdc_enabled` at
/// startup.
pub trait SegmentAllocator: Send + Sync {
    /// Reserves space for the mutation, switching segments as needed.
    ///
    /// # Errors
    ///
    /// CDC admission rejections and writer failures; see the
    /// implementations.
    fn allocate(&self, mutation: &Mutation, size: u32) -> CommitLogResult<Reservation>;

    /// Closes and unaccounts a segment the host has finished flushing.
    ///
    /// # Errors
    ///
    /// Propagates close and file-deletion failures.
    fn discard(&self, segment: &Segment, delete: bool) -> CommitLogResult<()>;

    /// Post-replay cleanup for a historical segment file name.
    ///
    /// # Errors
    ///
    /// Propagates deletion failures.
    fn handle_replayed(&self, file_name: &str) -> CommitLogResult<()>;

    /// The currently active segment.
    fn active_segment(&self) -> Arc<Segment>;

    /// Stops any background work owned by the allocator.
    fn shutdown(&self);
}

/// Builds the allocator selected by the configuration.
///
/// # Errors
///
/// Propagates directory preparation and initial-segment creation failures.
pub fn open(config: Config) -> CommitLogResult<Box<dyn SegmentAllocator>> {
    if config.cdc_enabled {
        Ok(Box::new(CdcAllocator::new(config)?))
    } else {
        Ok(Box::new(StandardAllocator::new(config)?))
    }
}

/// The allocator for nodes without CDC.
///
/// Keeps the hot path free of CDC bookkeeping: no hard links, no budget
/// accounting, no recalculation worker.
pub struct StandardAllocator {
    source: Arc<dyn SegmentSource>,
}

impl StandardAllocator {
    /// Opens the commit-log directory and creates the initial segment.
    ///
    /// # Errors
    ///
    /// Propagates directory and segment-creation failures.
    pub fn new(config: Config) -> CommitLogResult<Self> {
        let dir = Arc::new(CommitLogDir::open(&config)?);

        let factory: SegmentFactory = {
            let config = config.clone();
            Box::new(move |id| Ok(Arc::new(Segment::create(&dir, &config, id)?)))
        };

        let manager = SegmentManager::open(factory)?;
        Ok(Self { source: manager })
    }
}

impl SegmentAllocator for StandardAllocator {
    fn allocate(&self, _mutation: &Mutation, size: u32) -> CommitLogResult<Reservation> {
        let mut segment = self.source.active();
        loop {
            match segment.allocate(size)? {
                Some(reservation) => {
                    self.source.add_size(i64::from(size));
                    return Ok(reservation);
                }
                None => segment = self.source.switch_segment(&segment)?,
            }
        }
    }

    fn discard(&self, segment: &Segment, delete: bool) -> CommitLogResult<()> {
        segment.close()?;
        self.source.add_size(-(segment.on_disk_size() as i64));
        if delete {
            fs::remove_file(segment.log_path())?;
        }
        Ok(())
    }

    fn handle_replayed(&self, _file_name: &str) -> CommitLogResult<()> {
        // No CDC links exist on a non-CDC node; nothing to reap.
        Ok(())
    }

    fn active_segment(&self) -> Arc<Segment> {
        self.source.active()
    }

    fn shutdown(&self) {}
}

impl SegmentAllocator for CdcAllocator {
    fn allocate(&self, mutation: &Mutation, size: u32) -> CommitLogResult<Reservation> {
        CdcAllocator::allocate(self, mutation, size)
    }

    fn discard(&self, segment: &Segment, delete: bool) -> CommitLogResult<()> {
        CdcAllocator::discard(self, segment, delete)
    }

    fn handle_replayed(&self, file_name: &str) -> CommitLogResult<()> {
        CdcAllocator::handle_replayed(self, file_name)
    }

    fn active_segment(&self) -> Arc<Segment> {
        CdcAllocator::active_segment(self)
    }

    fn shutdown(&self) {
        CdcAllocator::shutdown(self);
    }
}

impl std::fmt::Debug for StandardAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardAllocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(root: &std::path::Path, cdc: bool) -> Config {
        Config::new(root.join("clog"), root.join("cdc_raw"))
            .cdc_enabled(cdc)
            .commitlog_segment_size_mb(1)
    }

    #[test]
    fn open_selects_standard_without_cdc() {
        let temp = tempdir().unwrap();
        let allocator = open(config(temp.path(), false)).unwrap();

        let mutation = Mutation::new("ks", vec![0u8; 64]);
        let reservation = allocator
            .allocate(&mutation, mutation.serialized_size())
            .unwrap();
        assert_eq!(reservation.segment_id, 1);

        // No CDC link was created for the segment.
        let active = allocator.active_segment();
        assert!(!active.cdc_link_path().exists());
        allocator.shutdown();
    }

    #[test]
    fn open_selects_cdc_when_enabled() {
        let temp = tempdir().unwrap();
        let allocator = open(config(temp.path(), true)).unwrap();

        let active = allocator.active_segment();
        assert!(active.cdc_link_path().exists());
        allocator.shutdown();
    }

    #[test]
    fn standard_allocator_rotates_full_segments() {
        let temp = tempdir().unwrap();
        let config = config(temp.path(), false);
        let allocator = StandardAllocator::new(config).unwrap();

        // Fill most of the 1 MiB segment, then force a hand-off.
        let big = Mutation::new("ks", vec![0u8; 700 * 1024]);
        let first = allocator.allocate(&big, big.serialized_size()).unwrap();
        assert_eq!(first.segment_id, 1);

        let second = allocator.allocate(&big, big.serialized_size()).unwrap();
        assert_eq!(second.segment_id, 2);
        assert_eq!(second.offset, 0);
    }

    #[test]
    fn standard_discard_removes_file_on_request() {
        let temp = tempdir().unwrap();
        let config = config(temp.path(), false);
        let allocator = StandardAllocator::new(config).unwrap();

        let segment = allocator.active_segment();
        let mutation = Mutation::new("ks", vec![0u8; 10]);
        allocator
            .allocate(&mutation, mutation.serialized_size())
            .unwrap();

        let stale = allocator.active_segment();
        // Promote a fresh segment, then drop the old one with deletion.
        let fresh = allocator.source.switch_segment(&stale).unwrap();
        assert_ne!(fresh.id(), segment.id());

        allocator.discard(&segment, true).unwrap();
        assert!(!segment.log_path().exists());
    }
}
