//! CDC disk-usage accounting and admission decisions.

use crate::cdc::sizer::DirectorySizer;
use crate::config::Config;
use crate::error::CommitLogResult;
use crate::manager::SegmentSource;
use crate::segment::{CdcState, Segment};
use crate::util::IntervalLimiter;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Tracks total disk usage of the CDC subsystem: the sum of all unflushed
/// segments reserved for CDC data and all segments archived into the
/// CDC-raw directory.
///
/// The accounted size has two components. The *unflushed* component is a
/// nominal reservation per live non-forbidden segment, moved by small
/// deltas under the affected segment's CDC state lock. The *flushed*
/// component is whatever actually sits in the CDC-raw directory; space
/// freed there by the external consumer is only discovered by a full
/// directory walk, which runs on a dedicated single-slot worker so writers
/// never wait on filesystem I/O.
///
/// Synchronous recalculation on every segment creation or discard would
/// stall new segment allocation, and with it the writer threads waiting for
/// a fresh segment; hence the async worker and the drift window it implies.
pub struct CdcSizeTracker {
    shared: Arc<TrackerShared>,
}

struct TrackerShared {
    /// Bytes in the CDC-raw directory as of the last completed walk, plus
    /// any replay adjustments. Replaced wholesale by the recalc worker with
    /// a single store.
    flushed_bytes: AtomicI64,
    /// Nominal reservations for live non-forbidden segments. Updated only
    /// under a segment's CDC state lock.
    unflushed_bytes: AtomicI64,
    budget_bytes: i64,
    default_segment_bytes: i64,
    sizer: DirectorySizer,
    limiter: IntervalLimiter,
    /// Whoever owns the active segment; consulted by the re-admission path.
    source: RwLock<Option<Weak<dyn SegmentSource>>>,
    /// Serializes recalculations: the worker and any synchronous caller.
    recalc_lock: Mutex<()>,
    executor: Mutex<Option<RecalcHandle>>,
}

struct RecalcHandle {
    tx: SyncSender<RecalcMessage>,
    worker: JoinHandle<()>,
}

enum RecalcMessage {
    Recalculate,
    Shutdown,
}

impl CdcSizeTracker {
    /// Creates a tracker for the given configuration.
    ///
    /// The tracker is inert until [`start`](Self::start): recalculation
    /// submissions are dropped and only delta accounting is applied.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            shared: Arc::new(TrackerShared {
                flushed_bytes: AtomicI64::new(0),
                unflushed_bytes: AtomicI64::new(0),
                budget_bytes: config.cdc_budget_bytes(),
                default_segment_bytes: config.segment_size_bytes() as i64,
                sizer: DirectorySizer::new(config.cdc_raw_directory()),
                limiter: IntervalLimiter::new(config.cdc_check_interval()),
                source: RwLock::new(None),
                recalc_lock: Mutex::new(()),
                executor: Mutex::new(None),
            }),
        }
    }

    /// Starts the recalculation worker, resetting the accounted size.
    ///
    /// Must precede the first [`on_new_segment`](Self::on_new_segment) so
    /// the reset does not wipe a live reservation. No-op if the worker is
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(&self) -> CommitLogResult<()> {
        let mut executor = self.shared.executor.lock();
        if executor.is_some() {
            return Ok(());
        }

        self.shared.flushed_bytes.store(0, Ordering::Release);
        self.shared.unflushed_bytes.store(0, Ordering::Release);

        let (tx, rx) = mpsc::sync_channel(1);
        let shared = Arc::clone(&self.shared);
        let worker = std::thread::Builder::new()
            .name("cdc-size-calculator".to_string())
            .spawn(move || run_worker(&shared, &rx))?;

        *executor = Some(RecalcHandle { tx, worker });
        Ok(())
    }

    /// Attaches the active-segment owner consulted by the re-admission
    /// path.
    ///
    /// Recalculations that run before a source is attached simply skip
    /// re-admission.
    pub fn attach_source(&self, source: &Arc<dyn SegmentSource>) {
        *self.shared.source.write() = Some(Arc::downgrade(source));
    }

    /// Stops the recalculation worker gracefully.
    ///
    /// An in-flight walk runs to completion before this returns. Idempotent.
    pub fn shutdown(&self) {
        let handle = self.shared.executor.lock().take();
        if let Some(RecalcHandle { tx, worker }) = handle {
            // The send is allowed to block: the queue drains within at most
            // one rate-limit interval per entry.
            let _ = tx.send(RecalcMessage::Shutdown);
            drop(tx);
            let _ = worker.join();
        }
    }

    /// Decides the CDC admission state of a freshly created segment from
    /// the currently accounted usage, reserving the nominal segment size
    /// when the segment is permitted.
    ///
    /// Also the re-admission path: a `Forbidden` segment that is still
    /// active is re-evaluated here after each directory walk.
    ///
    /// # Errors
    ///
    /// Fails only on a forbidden state transition, which indicates a bug in
    /// the caller.
    pub fn on_new_segment(&self, segment: &Segment) -> CommitLogResult<()> {
        self.shared.apply_admission_decision(segment)?;
        // Take the opportunity to pick up any consumer file deletions.
        self.submit_overflow_recalc();
        Ok(())
    }

    /// Adjusts accounting for a discarded segment.
    ///
    /// A `Contains` segment's bytes move into the flushed tally (the hard
    /// link keeps them on disk); any non-`Forbidden` segment releases the
    /// nominal reservation taken at creation.
    pub fn on_discard(&self, segment: &Segment) {
        {
            let mut reserved = segment.cdc_lock();
            // Add the flushed size before releasing the reservation so there
            // is no window of false generosity in which a new segment could
            // be admitted.
            if segment.cdc_state() == CdcState::Contains {
                self.shared
                    .flushed_bytes
                    .fetch_add(segment.on_disk_size() as i64, Ordering::AcqRel);
            }
            if *reserved {
                *reserved = false;
                self.shared
                    .unflushed_bytes
                    .fetch_sub(self.shared.default_segment_bytes, Ordering::AcqRel);
            }
        }
        self.submit_overflow_recalc();
    }

    /// Queues an asynchronous directory-size recalculation.
    ///
    /// At most one task is queued; submissions while one is pending are
    /// discarded, as is every submission while the tracker is not started.
    pub fn submit_overflow_recalc(&self) {
        self.shared.submit();
    }

    /// Runs one recalculation synchronously on the calling thread.
    ///
    /// Shares the worker's code path, including the rate limiter, so tests
    /// and operator tooling get a deterministic result without sleeping for
    /// the worker to catch up.
    ///
    /// # Errors
    ///
    /// Returns the walk's I/O error; the accounted size is left unchanged.
    pub fn recalculate_now(&self) -> CommitLogResult<i64> {
        self.shared.limiter.acquire();
        self.shared.recalculate()
    }

    /// Adds externally discovered flushed CDC bytes, e.g. segments
    /// re-tracked by the replayer.
    pub fn add_size(&self, delta: i64) {
        self.shared.flushed_bytes.fetch_add(delta, Ordering::AcqRel);
    }

    /// The currently accounted CDC bytes: flushed plus unflushed
    /// reservations.
    #[must_use]
    pub fn total_size_on_disk(&self) -> i64 {
        self.shared.total_size()
    }

    /// The immutable CDC budget in bytes.
    #[must_use]
    pub fn budget_bytes(&self) -> i64 {
        self.shared.budget_bytes
    }
}

impl Drop for CdcSizeTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CdcSizeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdcSizeTracker")
            .field(
                "flushed_bytes",
                &self.shared.flushed_bytes.load(Ordering::Relaxed),
            )
            .field(
                "unflushed_bytes",
                &self.shared.unflushed_bytes.load(Ordering::Relaxed),
            )
            .field("budget_bytes", &self.shared.budget_bytes)
            .finish_non_exhaustive()
    }
}

impl TrackerShared {
    fn total_size(&self) -> i64 {
        self.flushed_bytes.load(Ordering::Acquire) + self.unflushed_bytes.load(Ordering::Acquire)
    }

    /// Applies the creation-time (or re-admission) state decision under the
    /// segment's CDC state lock, moving state and accounting together.
    ///
    /// Idempotent: the reservation flag guarded by the same lock records
    /// whether this segment's nominal size is already counted, so a repeated
    /// evaluation neither double-reserves nor leaks on a `Permitted ->
    /// Forbidden` flip.
    fn apply_admission_decision(&self, segment: &Segment) -> CommitLogResult<()> {
        let mut reserved = segment.cdc_lock();
        let current = segment.cdc_state();
        let accounted = self.total_size();
        let total = if *reserved {
            accounted
        } else {
            self.default_segment_bytes + accounted
        };
        let next = if total > self.budget_bytes {
            CdcState::Forbidden
        } else {
            CdcState::Permitted
        };
        segment.cdc().compare_and_set(&reserved, current, next)?;
        match next {
            CdcState::Permitted if !*reserved => {
                *reserved = true;
                self.unflushed_bytes
                    .fetch_add(self.default_segment_bytes, Ordering::AcqRel);
            }
            CdcState::Forbidden if *reserved => {
                *reserved = false;
                self.unflushed_bytes
                    .fetch_sub(self.default_segment_bytes, Ordering::AcqRel);
            }
            _ => {}
        }
        Ok(())
    }

    fn submit(&self) {
        let executor = self.executor.lock();
        if let Some(handle) = executor.as_ref() {
            match handle.tx.try_send(RecalcMessage::Recalculate) {
                Ok(()) => {}
                // One already pending; it will satisfy this request too.
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// Walks the CDC-raw directory and replaces the flushed tally with the
    /// result, then re-evaluates the currently active segment if it is
    /// `Forbidden` - consumer drain may have freed enough budget to admit
    /// CDC writes again.
    fn recalculate(&self) -> CommitLogResult<i64> {
        // One recalculation at a time, whether from the worker or from a
        // synchronous caller.
        let _recalc = self.recalc_lock.lock();

        let walked = self.sizer.walk()?;
        let flushed = i64::try_from(walked).unwrap_or(i64::MAX);
        self.flushed_bytes.store(flushed, Ordering::Release);
        debug!(flushed_bytes = flushed, "CDC directory size recalculated");

        let source = self.source.read().as_ref().and_then(Weak::upgrade);
        if let Some(source) = source {
            // Re-evaluate whichever segment is active now, not the one that
            // was active when the recalculation was submitted.
            let active = source.active();
            if active.cdc_state() == CdcState::Forbidden {
                self.apply_admission_decision(&active)?;
                // Keep probing until the segment is admitted; the rate
                // limiter is the sole defense against a tight re-admit loop.
                self.submit();
            }
        }

        Ok(self.total_size())
    }
}

fn run_worker(shared: &TrackerShared, rx: &Receiver<RecalcMessage>) {
    while let Ok(message) = rx.recv() {
        match message {
            RecalcMessage::Recalculate => {
                shared.limiter.acquire();
                if let Err(err) = shared.recalculate() {
                    error!(
                        error = %err,
                        directory = %shared.sizer.root().display(),
                        "CDC size recalculation failed; accounted size left unchanged"
                    );
                }
            }
            RecalcMessage::Shutdown => break,
        }
    }
}
