//! Commit-log directory management.
//!
//! This module handles the file system layout for the commit log:
//!
//! ```text
//! <commitlog_directory>/
//! ├─ LOCK                     # Advisory lock for single-writer
//! ├─ CommitLog-1-000001.log   # Segment files
//! └─ CommitLog-1-000002.log
//! <cdc_raw_directory>/
//! ├─ CommitLog-1-000001.log       # Hard link to the segment above
//! └─ CommitLog-1-000001.cdc_idx   # Sidecar written once fully synced
//! ```
//!
//! The LOCK file ensures only one process writes the commit log at a time.
//! Links in the CDC-raw directory share the segment's basename; the
//! `.cdc_idx` sidecar marks a link as fully produced. A link without a
//! sidecar is an orphan from an unfinished producer and is reaped at replay.

use crate::config::Config;
use crate::error::{CommitLogError, CommitLogResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Segment file format version, embedded in segment file names.
pub const SEGMENT_FORMAT_VERSION: u16 = 1;

const LOCK_FILE: &str = "LOCK";
const SEGMENT_EXTENSION: &str = "log";
const CDC_INDEX_EXTENSION: &str = "cdc_idx";

/// Manages the commit-log directory structure and file locking.
///
/// # Thread Safety
///
/// The `CommitLogDir` holds an exclusive advisory lock on the commit-log
/// directory. Only one instance can exist per directory at a time.
#[derive(Debug)]
pub struct CommitLogDir {
    commitlog: PathBuf,
    cdc_raw: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl CommitLogDir {
    /// Opens (creating if needed) the commit-log and CDC-raw directories
    /// and acquires the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`CommitLogError::DirectoryLocked`] if another process holds
    /// the lock, or an I/O error if the directories cannot be created.
    pub fn open(config: &Config) -> CommitLogResult<Self> {
        fs::create_dir_all(&config.commitlog_directory)?;
        fs::create_dir_all(&config.cdc_raw_directory)?;

        let lock_path = config.commitlog_directory.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CommitLogError::DirectoryLocked);
        }

        Ok(Self {
            commitlog: config.commitlog_directory.clone(),
            cdc_raw: config.cdc_raw_directory.clone(),
            _lock_file: lock_file,
        })
    }

    /// The commit-log directory.
    #[must_use]
    pub fn commitlog_dir(&self) -> &Path {
        &self.commitlog
    }

    /// The CDC-raw directory.
    #[must_use]
    pub fn cdc_raw_dir(&self) -> &Path {
        &self.cdc_raw
    }

    /// The file name of the segment with the given id.
    #[must_use]
    pub fn segment_file_name(&self, segment_id: u64) -> String {
        format!("CommitLog-{SEGMENT_FORMAT_VERSION}-{segment_id:06}.{SEGMENT_EXTENSION}")
    }

    /// The primary path of the segment with the given id.
    #[must_use]
    pub fn segment_path(&self, segment_id: u64) -> PathBuf {
        self.commitlog.join(self.segment_file_name(segment_id))
    }

    /// The CDC hard-link path for the segment with the given id.
    #[must_use]
    pub fn cdc_link_path(&self, segment_id: u64) -> PathBuf {
        self.cdc_raw.join(self.segment_file_name(segment_id))
    }

    /// The CDC-index sidecar path for the segment with the given id.
    #[must_use]
    pub fn cdc_index_path(&self, segment_id: u64) -> PathBuf {
        self.cdc_raw
            .join(self.segment_file_name(segment_id))
            .with_extension(CDC_INDEX_EXTENSION)
    }

    /// The CDC hard-link path for an arbitrary segment file name.
    ///
    /// Used at replay time, when only the file name of a historical segment
    /// is known.
    #[must_use]
    pub fn cdc_link_for(&self, file_name: &str) -> PathBuf {
        self.cdc_raw.join(file_name)
    }

    /// The CDC-index sidecar path for an arbitrary segment file name.
    #[must_use]
    pub fn cdc_index_for(&self, file_name: &str) -> PathBuf {
        self.cdc_raw.join(file_name).with_extension(CDC_INDEX_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(root: &Path) -> Config {
        Config::new(root.join("clog"), root.join("cdc_raw"))
    }

    #[test]
    fn open_creates_directories() {
        let temp = tempdir().unwrap();
        let config = config(temp.path());

        let dir = CommitLogDir::open(&config).unwrap();
        assert!(config.commitlog_directory.is_dir());
        assert!(config.cdc_raw_directory.is_dir());

        drop(dir);
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let config = config(temp.path());

        let _dir1 = CommitLogDir::open(&config).unwrap();
        let result = CommitLogDir::open(&config);
        assert!(matches!(result, Err(CommitLogError::DirectoryLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let config = config(temp.path());

        {
            let _dir = CommitLogDir::open(&config).unwrap();
        }
        let _dir2 = CommitLogDir::open(&config).unwrap();
    }

    #[test]
    fn paths_are_derived_from_id() {
        let temp = tempdir().unwrap();
        let config = config(temp.path());
        let dir = CommitLogDir::open(&config).unwrap();

        assert_eq!(dir.segment_file_name(42), "CommitLog-1-000042.log");
        assert_eq!(
            dir.segment_path(42),
            config.commitlog_directory.join("CommitLog-1-000042.log")
        );
        assert_eq!(
            dir.cdc_link_path(42),
            config.cdc_raw_directory.join("CommitLog-1-000042.log")
        );
        assert_eq!(
            dir.cdc_index_path(42),
            config.cdc_raw_directory.join("CommitLog-1-000042.cdc_idx")
        );
    }

    #[test]
    fn replay_paths_from_file_name() {
        let temp = tempdir().unwrap();
        let config = config(temp.path());
        let dir = CommitLogDir::open(&config).unwrap();

        assert_eq!(
            dir.cdc_link_for("CommitLog-1-000007.log"),
            config.cdc_raw_directory.join("CommitLog-1-000007.log")
        );
        assert_eq!(
            dir.cdc_index_for("CommitLog-1-000007.log"),
            config.cdc_raw_directory.join("CommitLog-1-000007.cdc_idx")
        );
    }
}
