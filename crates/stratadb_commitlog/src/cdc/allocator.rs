//! The CDC-aware segment allocator.

use crate::cdc::link::CdcLinkManager;
use crate::cdc::size_tracker::CdcSizeTracker;
use crate::config::Config;
use crate::dir::CommitLogDir;
use crate::error::{CommitLogError, CommitLogResult};
use crate::manager::{SegmentFactory, SegmentManager, SegmentSource};
use crate::mutation::Mutation;
use crate::segment::{CdcState, Reservation, Segment};
use crate::util::LogRateLimiter;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How often the same keyspace may appear in rejection warnings.
const REJECTION_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// A segment allocator that respects the configured total allowable CDC
/// space on disk.
///
/// On allocation of a mutation it checks whether the mutation is tracked by
/// CDC and, if so, either rejects it when the budget is exhausted or flags
/// the segment as containing CDC data.
pub struct CdcAllocator {
    config: Config,
    source: Arc<dyn SegmentSource>,
    tracker: Arc<CdcSizeTracker>,
    links: Arc<CdcLinkManager>,
    nospam: LogRateLimiter,
}

impl CdcAllocator {
    /// Opens the commit-log directories and brings up the allocator: size
    /// tracking worker, initial segment, and its CDC hard link.
    ///
    /// # Errors
    ///
    /// Fails if the directories cannot be prepared, the tracking worker
    /// cannot be spawned, or the initial segment cannot be created and
    /// linked.
    pub fn new(config: Config) -> CommitLogResult<Self> {
        let dir = Arc::new(CommitLogDir::open(&config)?);
        let tracker = Arc::new(CdcSizeTracker::new(&config));
        let links = Arc::new(CdcLinkManager::new(Arc::clone(&dir)));

        // Start before the first segment exists so the counter reset cannot
        // wipe a live reservation.
        tracker.start()?;

        let factory: SegmentFactory = {
            let dir = Arc::clone(&dir);
            let config = config.clone();
            let tracker = Arc::clone(&tracker);
            let links = Arc::clone(&links);
            Box::new(move |id| {
                let segment = Arc::new(Segment::create(&dir, &config, id)?);
                // Hard link into the CDC-raw directory for realtime
                // tracking; failure here is fatal and the segment is never
                // exposed as active.
                links.create_link(&segment)?;
                tracker.on_new_segment(&segment)?;
                Ok(segment)
            })
        };

        let manager = SegmentManager::open(factory)?;
        let source: Arc<dyn SegmentSource> = manager;
        tracker.attach_source(&source);

        Ok(Self {
            config,
            source,
            tracker,
            links,
            nospam: LogRateLimiter::new(REJECTION_LOG_INTERVAL),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_source(
        config: Config,
        source: Arc<dyn SegmentSource>,
    ) -> CommitLogResult<Self> {
        let dir = Arc::new(CommitLogDir::open(&config)?);
        let tracker = Arc::new(CdcSizeTracker::new(&config));
        let links = Arc::new(CdcLinkManager::new(dir));
        Ok(Self {
            config,
            source,
            tracker,
            links,
            nospam: LogRateLimiter::new(REJECTION_LOG_INTERVAL),
        })
    }

    /// Reserves space for the mutation in the active segment, switching to
    /// a fresh segment when the active one is full.
    ///
    /// `size` is the mutation's total footprint: entry overhead plus
    /// serialized size.
    ///
    /// # Errors
    ///
    /// Returns [`CommitLogError::CdcWriteRejected`] for a CDC-tracked
    /// mutation while the segment disallows CDC writes; writer failures
    /// propagate verbatim.
    pub fn allocate(&self, mutation: &Mutation, size: u32) -> CommitLogResult<Reservation> {
        let mut segment = self.source.active();
        loop {
            self.reject_if_forbidden(mutation, &segment)?;
            match segment.allocate(size)? {
                Some(reservation) => {
                    // Tag strictly after the reservation succeeded so a
                    // segment whose reservation failed is never marked.
                    if mutation.is_cdc_tracked() {
                        segment.mark_cdc_contains()?;
                    }
                    self.source.add_size(i64::from(size));
                    return Ok(reservation);
                }
                // Full segment: promote a fresh one and re-check admission
                // against it. The retry is unbounded: failing to allocate
                // would mean the node cannot accept writes at all, and
                // upstream validation guarantees a segment is wider than any
                // single mutation.
                None => segment = self.source.switch_segment(&segment)?,
            }
        }
    }

    /// Closes and unaccounts a segment the host has finished flushing.
    ///
    /// A segment that never admitted CDC data loses its CDC link and index
    /// sidecar; a `Contains` segment keeps both for the consumer.
    ///
    /// # Errors
    ///
    /// Propagates close failures and primary-file deletion failures. Link
    /// removal failures are logged, not returned; orphans are reaped at the
    /// next replay.
    pub fn discard(&self, segment: &Segment, delete: bool) -> CommitLogResult<()> {
        segment.close()?;
        self.source.add_size(-(segment.on_disk_size() as i64));

        self.tracker.on_discard(segment);

        if delete {
            fs::remove_file(segment.log_path())?;
        }

        if segment.cdc_state() != CdcState::Contains {
            // File may not exist when processing a discard during startup.
            if let Err(err) = self.links.remove_link(segment) {
                warn!(
                    segment_id = segment.id(),
                    error = %err,
                    "failed to remove CDC link at discard"
                );
            }
        }
        Ok(())
    }

    /// Deletes the untracked CDC link of a replayed segment file, if its
    /// index sidecar never appeared.
    ///
    /// # Errors
    ///
    /// Propagates deletion failures.
    pub fn handle_replayed(&self, file_name: &str) -> CommitLogResult<()> {
        self.links.remove_orphan(file_name)?;
        Ok(())
    }

    /// Accounts CDC bytes rediscovered by the replayer after it re-links
    /// historical segments.
    pub fn add_cdc_size(&self, delta: i64) {
        self.tracker.add_size(delta);
    }

    /// Stops the size-tracking worker. In-flight recalculations run to
    /// completion.
    pub fn shutdown(&self) {
        self.tracker.shutdown();
    }

    /// The currently active segment.
    #[must_use]
    pub fn active_segment(&self) -> Arc<Segment> {
        self.source.active()
    }

    /// The CDC size tracker, exposed for the host's metrics and for
    /// deterministic recalculation in tests.
    #[must_use]
    pub fn size_tracker(&self) -> &CdcSizeTracker {
        &self.tracker
    }

    fn reject_if_forbidden(&self, mutation: &Mutation, segment: &Segment) -> CommitLogResult<()> {
        if mutation.is_cdc_tracked() && segment.cdc_state() == CdcState::Forbidden {
            // Best-effort: the consumer may have drained since the last
            // walk, and the recalculation is what would re-admit us.
            self.tracker.submit_overflow_recalc();
            if self.nospam.should_log(mutation.keyspace()) {
                warn!(
                    keyspace = mutation.keyspace(),
                    cdc_directory = %self.config.cdc_raw_directory().display(),
                    "rejecting CDC mutation; free up space by processing CDC logs"
                );
            }
            return Err(CommitLogError::cdc_write_rejected(
                mutation.keyspace(),
                self.config.cdc_raw_directory(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CdcAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdcAllocator")
            .field("cdc_raw_directory", &self.config.cdc_raw_directory())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
