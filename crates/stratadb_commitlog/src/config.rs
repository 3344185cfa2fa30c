//! Commit-log configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Configuration for the commit-log allocator.
///
/// The configuration is read-only after construction; components receive it
/// by value at construction time rather than consulting global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the primary commit-log segment files.
    pub commitlog_directory: PathBuf,

    /// Directory holding hard links to CDC-tracked segments, consumed
    /// out-of-band by the CDC consumer.
    pub cdc_raw_directory: PathBuf,

    /// Whether CDC is enabled on this node. Selects the CDC-aware allocator
    /// over the standard one.
    pub cdc_enabled: bool,

    /// Maximum bytes of CDC data allowed on disk, in mebibytes.
    pub cdc_total_space_mb: u32,

    /// Minimum interval between CDC directory size recalculations, in
    /// milliseconds.
    pub cdc_free_space_check_interval_ms: u32,

    /// Nominal segment size, in mebibytes. Used both as the writer capacity
    /// and as the budget reservation for a new CDC-permitted segment.
    pub commitlog_segment_size_mb: u32,
}

impl Config {
    /// Creates a configuration with default values for the given
    /// directories.
    pub fn new(commitlog_directory: impl Into<PathBuf>, cdc_raw_directory: impl Into<PathBuf>) -> Self {
        Self {
            commitlog_directory: commitlog_directory.into(),
            cdc_raw_directory: cdc_raw_directory.into(),
            cdc_enabled: false,
            cdc_total_space_mb: 4096,
            cdc_free_space_check_interval_ms: 250,
            commitlog_segment_size_mb: 32,
        }
    }

    /// Enables or disables CDC.
    #[must_use]
    pub fn cdc_enabled(mut self, value: bool) -> Self {
        self.cdc_enabled = value;
        self
    }

    /// Sets the CDC disk budget in mebibytes.
    #[must_use]
    pub fn cdc_total_space_mb(mut self, value: u32) -> Self {
        self.cdc_total_space_mb = value;
        self
    }

    /// Sets the recalculation interval in milliseconds.
    #[must_use]
    pub fn cdc_free_space_check_interval_ms(mut self, value: u32) -> Self {
        self.cdc_free_space_check_interval_ms = value;
        self
    }

    /// Sets the nominal segment size in mebibytes.
    #[must_use]
    pub fn commitlog_segment_size_mb(mut self, value: u32) -> Self {
        self.commitlog_segment_size_mb = value;
        self
    }

    /// The CDC budget in bytes.
    #[must_use]
    pub fn cdc_budget_bytes(&self) -> i64 {
        i64::from(self.cdc_total_space_mb) * MIB as i64
    }

    /// The nominal segment size in bytes.
    #[must_use]
    pub fn segment_size_bytes(&self) -> u64 {
        u64::from(self.commitlog_segment_size_mb) * MIB
    }

    /// The minimum interval between directory size recalculations.
    #[must_use]
    pub fn cdc_check_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.cdc_free_space_check_interval_ms))
    }

    /// The commit-log directory.
    #[must_use]
    pub fn commitlog_directory(&self) -> &Path {
        &self.commitlog_directory
    }

    /// The CDC-raw directory.
    #[must_use]
    pub fn cdc_raw_directory(&self) -> &Path {
        &self.cdc_raw_directory
    }
}
