//! Active-segment ownership and hand-off.

use crate::error::CommitLogResult;
use crate::segment::Segment;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Capability exposed by whoever owns the active segment.
///
/// Writer threads fetch the active segment, attempt a reservation, and on a
/// full segment drive a hand-off through [`switch_segment`]. Implementations
/// serialize the hand-off; callers must tolerate `active` briefly returning
/// a segment that is already full and loop.
///
/// [`switch_segment`]: Self::switch_segment
pub trait SegmentSource: Send + Sync {
    /// The current active segment.
    fn active(&self) -> Arc<Segment>;

    /// Promotes a fresh segment because `current` could not fit a
    /// reservation.
    ///
    /// If another thread already switched away from `current`, the
    /// newer active segment is returned without creating one.
    ///
    /// # Errors
    ///
    /// Propagates segment-creation failures (these are fatal: a node that
    /// cannot create segments cannot accept writes).
    fn switch_segment(&self, current: &Segment) -> CommitLogResult<Arc<Segment>>;

    /// Adjusts the global live-bytes counter.
    fn add_size(&self, delta: i64);
}

/// Creates segments on demand, given the next ascending segment id.
pub type SegmentFactory = Box<dyn Fn(u64) -> CommitLogResult<Arc<Segment>> + Send + Sync>;

/// Owns the active commit-log segment and performs serialized hand-off.
///
/// Segment ids are assigned here and ascend monotonically; across segments,
/// write ordering is defined by those ids. Creation itself is delegated to
/// the factory, which the allocator wires up with CDC linking and budget
/// bookkeeping.
pub struct SegmentManager {
    factory: SegmentFactory,
    active: RwLock<Arc<Segment>>,
    next_id: AtomicU64,
    /// Serializes hand-off so concurrent full-segment writers create at most
    /// one fresh segment.
    switch_lock: Mutex<()>,
    total_size: AtomicI64,
}

impl SegmentManager {
    /// Opens a manager, eagerly creating the first active segment.
    ///
    /// # Errors
    ///
    /// Propagates the factory's failure to create the initial segment.
    pub fn open(factory: SegmentFactory) -> CommitLogResult<Arc<Self>> {
        let first = factory(1)?;
        Ok(Arc::new(Self {
            factory,
            active: RwLock::new(first),
            next_id: AtomicU64::new(2),
            switch_lock: Mutex::new(()),
            total_size: AtomicI64::new(0),
        }))
    }

    /// Total live bytes across segments, as adjusted through
    /// [`SegmentSource::add_size`].
    #[must_use]
    pub fn total_size(&self) -> i64 {
        self.total_size.load(Ordering::Acquire)
    }
}

impl SegmentSource for SegmentManager {
    fn active(&self) -> Arc<Segment> {
        Arc::clone(&self.active.read())
    }

    fn switch_segment(&self, current: &Segment) -> CommitLogResult<Arc<Segment>> {
        let _guard = self.switch_lock.lock();

        // Another thread may have completed the hand-off while we waited.
        let active = Arc::clone(&self.active.read());
        if active.id() != current.id() {
            return Ok(active);
        }

        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let fresh = (self.factory)(id)?;
        *self.active.write() = Arc::clone(&fresh);
        Ok(fresh)
    }

    fn add_size(&self, delta: i64) {
        self.total_size.fetch_add(delta, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentManager")
            .field("active_segment_id", &self.active.read().id())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("total_size", &self.total_size.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::testing::memory_segment;

    fn manager(capacity: u64) -> Arc<SegmentManager> {
        SegmentManager::open(Box::new(move |id| Ok(Arc::new(memory_segment(id, capacity)))))
            .unwrap()
    }

    #[test]
    fn opens_with_initial_segment() {
        let manager = manager(64);
        assert_eq!(manager.active().id(), 1);
    }

    #[test]
    fn switch_promotes_fresh_segment() {
        let manager = manager(64);
        let first = manager.active();

        let fresh = manager.switch_segment(&first).unwrap();
        assert_eq!(fresh.id(), 2);
        assert_eq!(manager.active().id(), 2);
    }

    #[test]
    fn stale_switch_returns_current_active() {
        let manager = manager(64);
        let first = manager.active();

        manager.switch_segment(&first).unwrap();
        // A second caller still holding the old segment does not trigger
        // another hand-off.
        let observed = manager.switch_segment(&first).unwrap();
        assert_eq!(observed.id(), 2);
        assert_eq!(manager.active().id(), 2);
    }

    #[test]
    fn ids_ascend_across_switches() {
        let manager = manager(64);
        for expected in 2..6 {
            let active = manager.active();
            let fresh = manager.switch_segment(&active).unwrap();
            assert_eq!(fresh.id(), expected);
        }
    }

    #[test]
    fn size_counter_tracks_deltas() {
        let manager = manager(64);
        manager.add_size(100);
        manager.add_size(-40);
        assert_eq!(manager.total_size(), 60);
    }

    #[test]
    fn concurrent_switches_create_one_segment() {
        let manager = manager(64);
        let stale = manager.active();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            let stale = Arc::clone(&stale);
            handles.push(std::thread::spawn(move || {
                manager.switch_segment(&stale).unwrap().id()
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    }
}
