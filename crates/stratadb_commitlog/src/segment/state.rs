//! Per-segment CDC state machine.

use crate::error::{CommitLogError, CommitLogResult};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU8, Ordering};

/// CDC admission state of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcState {
    /// The segment may admit CDC-tracked mutations.
    Permitted,
    /// The CDC budget was exhausted when this state was decided; CDC-tracked
    /// mutations are rejected.
    Forbidden,
    /// The segment holds at least one CDC-tracked mutation. Terminal.
    Contains,
}

impl CdcState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Permitted => 0,
            Self::Forbidden => 1,
            Self::Contains => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Permitted,
            1 => Self::Forbidden,
            _ => Self::Contains,
        }
    }
}

/// Holds one segment's CDC state together with the lock that serializes
/// transitions and budget accounting.
///
/// The lock guards the state and the segment's budget-reservation flag as
/// one unit, so state transitions and accounting deltas always move
/// together. It is dedicated to CDC bookkeeping: transitions must be
/// serializable with size accounting, but independent of the segment's
/// data-append path, so the write hot path never waits on a recalculation.
///
/// State is published with release/acquire semantics; [`get`](Self::get)
/// never takes the lock.
#[derive(Debug)]
pub struct CdcStateCell {
    segment_id: u64,
    state: AtomicU8,
    /// `true` while this segment holds a nominal reservation against the
    /// CDC budget. Only the size tracker flips it, under the lock.
    reservation: Mutex<bool>,
}

impl CdcStateCell {
    /// Creates a cell for the given segment, initially
    /// [`CdcState::Permitted`] pending the creation-time budget decision.
    #[must_use]
    pub fn new(segment_id: u64) -> Self {
        Self {
            segment_id,
            state: AtomicU8::new(CdcState::Permitted.as_u8()),
            reservation: Mutex::new(false),
        }
    }

    /// Returns the current state without locking.
    #[must_use]
    pub fn get(&self) -> CdcState {
        CdcState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Acquires the state lock, giving access to the reservation flag.
    ///
    /// Budget accounting deltas must be applied while the returned guard is
    /// held, so that state and accounting move together.
    pub fn lock(&self) -> MutexGuard<'_, bool> {
        self.reservation.lock()
    }

    /// Transitions `expected -> next` while the state lock is held.
    ///
    /// Returns `false` without changing anything if the current state is not
    /// `expected`.
    ///
    /// # Errors
    ///
    /// Rejects transitions out of [`CdcState::Contains`] (it is terminal)
    /// and `Forbidden -> Contains` (a forbidden segment can never have
    /// admitted CDC data); either attempt indicates an admission bug.
    pub fn compare_and_set(
        &self,
        _guard: &MutexGuard<'_, bool>,
        expected: CdcState,
        next: CdcState,
    ) -> CommitLogResult<bool> {
        let current = self.get();
        if current != expected {
            return Ok(false);
        }
        if current == next {
            return Ok(true);
        }
        if current == CdcState::Contains || next == CdcState::Contains {
            return Err(CommitLogError::invalid_cdc_transition(
                self.segment_id,
                current,
                next,
            ));
        }
        self.state.store(next.as_u8(), Ordering::Release);
        Ok(true)
    }

    /// Marks the segment as containing CDC data: `Permitted -> Contains`.
    ///
    /// No-op when already `Contains`. Called by the allocator strictly after
    /// a CDC-tracked reservation succeeded.
    ///
    /// # Errors
    ///
    /// Fails on a `Forbidden` segment: a reservation that was admitted on a
    /// forbidden segment means admission did not precede reservation.
    pub fn mark_contains(&self) -> CommitLogResult<()> {
        let _guard = self.reservation.lock();
        match self.get() {
            CdcState::Contains => Ok(()),
            CdcState::Permitted => {
                self.state
                    .store(CdcState::Contains.as_u8(), Ordering::Release);
                Ok(())
            }
            CdcState::Forbidden => Err(CommitLogError::invalid_cdc_transition(
                self.segment_id,
                CdcState::Forbidden,
                CdcState::Contains,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_permitted() {
        let cell = CdcStateCell::new(1);
        assert_eq!(cell.get(), CdcState::Permitted);
        assert!(!*cell.lock());
    }

    #[test]
    fn permitted_to_forbidden_and_back() {
        let cell = CdcStateCell::new(1);
        let guard = cell.lock();
        assert!(cell
            .compare_and_set(&guard, CdcState::Permitted, CdcState::Forbidden)
            .unwrap());
        assert_eq!(cell.get(), CdcState::Forbidden);
        assert!(cell
            .compare_and_set(&guard, CdcState::Forbidden, CdcState::Permitted)
            .unwrap());
        assert_eq!(cell.get(), CdcState::Permitted);
    }

    #[test]
    fn stale_expectation_is_refused() {
        let cell = CdcStateCell::new(1);
        let guard = cell.lock();
        assert!(!cell
            .compare_and_set(&guard, CdcState::Forbidden, CdcState::Permitted)
            .unwrap());
        assert_eq!(cell.get(), CdcState::Permitted);
    }

    #[test]
    fn mark_contains_from_permitted() {
        let cell = CdcStateCell::new(1);
        cell.mark_contains().unwrap();
        assert_eq!(cell.get(), CdcState::Contains);
        // Idempotent.
        cell.mark_contains().unwrap();
        assert_eq!(cell.get(), CdcState::Contains);
    }

    #[test]
    fn mark_contains_on_forbidden_fails_loudly() {
        let cell = CdcStateCell::new(7);
        {
            let guard = cell.lock();
            cell.compare_and_set(&guard, CdcState::Permitted, CdcState::Forbidden)
                .unwrap();
        }
        let err = cell.mark_contains().unwrap_err();
        assert!(matches!(
            err,
            CommitLogError::InvalidCdcTransition { segment_id: 7, .. }
        ));
        assert_eq!(cell.get(), CdcState::Forbidden);
    }

    #[test]
    fn contains_is_terminal() {
        let cell = CdcStateCell::new(1);
        cell.mark_contains().unwrap();
        let guard = cell.lock();
        for target in [CdcState::Permitted, CdcState::Forbidden] {
            let err = cell
                .compare_and_set(&guard, CdcState::Contains, target)
                .unwrap_err();
            assert!(matches!(err, CommitLogError::InvalidCdcTransition { .. }));
            assert_eq!(cell.get(), CdcState::Contains);
        }
    }

    #[test]
    fn forbidden_never_reaches_contains_via_cas() {
        let cell = CdcStateCell::new(1);
        let guard = cell.lock();
        cell.compare_and_set(&guard, CdcState::Permitted, CdcState::Forbidden)
            .unwrap();
        let err = cell
            .compare_and_set(&guard, CdcState::Forbidden, CdcState::Contains)
            .unwrap_err();
        assert!(matches!(err, CommitLogError::InvalidCdcTransition { .. }));
    }

    #[test]
    fn reservation_flag_travels_with_the_guard() {
        let cell = CdcStateCell::new(1);
        {
            let mut guard = cell.lock();
            *guard = true;
        }
        assert!(*cell.lock());
    }
}
