//! Blocking interval rate limiter.

use parking_lot::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Grants one permit per configured interval, blocking callers until their
/// permit comes due.
///
/// Permits are scheduled back-to-back: a burst of callers is serialized at
/// one permit per interval rather than all sleeping until the same instant.
/// A zero interval grants permits immediately.
#[derive(Debug)]
pub struct IntervalLimiter {
    interval: Duration,
    next_free: Mutex<Instant>,
}

impl IntervalLimiter {
    /// Creates a limiter granting one permit per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_free: Mutex::new(Instant::now()),
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }

    /// Takes a permit if one is available without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut next_free = self.next_free.lock();
        let now = Instant::now();
        if now < *next_free {
            return false;
        }
        *next_free = now + self.interval;
        true
    }

    /// Reserves the next permit slot and returns how long to wait for it.
    fn reserve(&self) -> Duration {
        let mut next_free = self.next_free.lock();
        let now = Instant::now();
        if now >= *next_free {
            *next_free = now + self.interval;
            Duration::ZERO
        } else {
            let wait = *next_free - now;
            *next_free += self.interval;
            wait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_never_blocks() {
        let limiter = IntervalLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn second_acquire_waits_for_interval() {
        let limiter = IntervalLimiter::new(Duration::from_millis(20));
        let start = Instant::now();
        limiter.acquire();
        limiter.acquire();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn try_acquire_refuses_during_interval() {
        let limiter = IntervalLimiter::new(Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
