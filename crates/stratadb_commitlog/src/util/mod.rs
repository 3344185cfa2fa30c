//! Small shared utilities.

mod nospam;
mod throttle;

pub use nospam::LogRateLimiter;
pub use throttle::IntervalLimiter;
