//! Per-key suppression of repetitive log output.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Decides whether a log line keyed by a string should be emitted, allowing
/// at most one emission per key per interval.
///
/// The caller pairs this with an ordinary `tracing` macro:
///
/// ```ignore
/// if self.nospam.should_log(keyspace) {
///     warn!(keyspace, "rejecting mutation");
/// }
/// ```
#[derive(Debug)]
pub struct LogRateLimiter {
    interval: Duration,
    last_emit: Mutex<HashMap<String, Instant>>,
}

impl LogRateLimiter {
    /// Creates a limiter allowing one emission per key per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if a line for `key` should be emitted now, recording
    /// the emission.
    pub fn should_log(&self, key: &str) -> bool {
        let mut last_emit = self.last_emit.lock();
        let now = Instant::now();
        match last_emit.get(key) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                last_emit.insert(key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emission_allowed() {
        let limiter = LogRateLimiter::new(Duration::from_secs(10));
        assert!(limiter.should_log("ks1"));
    }

    #[test]
    fn repeat_within_interval_suppressed() {
        let limiter = LogRateLimiter::new(Duration::from_secs(10));
        assert!(limiter.should_log("ks1"));
        assert!(!limiter.should_log("ks1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = LogRateLimiter::new(Duration::from_secs(10));
        assert!(limiter.should_log("ks1"));
        assert!(limiter.should_log("ks2"));
    }

    #[test]
    fn emission_allowed_after_interval() {
        let limiter = LogRateLimiter::new(Duration::from_millis(1));
        assert!(limiter.should_log("ks1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.should_log("ks1"));
    }
}
