//! CDC-raw directory size measurement.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Computes the total on-disk byte size of the CDC-raw directory.
///
/// One walk sums the sizes of all regular files; symlinks are not followed.
/// The accumulator is local to each walk, so concurrent walks cannot observe
/// each other's partial sums.
#[derive(Debug, Clone)]
pub struct DirectorySizer {
    root: PathBuf,
}

impl DirectorySizer {
    /// Creates a sizer rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this sizer measures.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the tree and returns the total byte size of regular files.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error encountered; the partial sum is
    /// discarded.
    pub fn walk(&self) -> io::Result<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_directory_is_zero() {
        let temp = tempdir().unwrap();
        let sizer = DirectorySizer::new(temp.path());
        assert_eq!(sizer.walk().unwrap(), 0);
    }

    #[test]
    fn sums_regular_files() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.log"), vec![0u8; 100]).unwrap();
        fs::write(temp.path().join("b.log"), vec![0u8; 250]).unwrap();

        let sizer = DirectorySizer::new(temp.path());
        assert_eq!(sizer.walk().unwrap(), 350);
    }

    #[test]
    fn recurses_into_subdirectories() {
        let temp = tempdir().unwrap();
        let sub = temp.path().join("nested");
        fs::create_dir(&sub).unwrap();
        fs::write(temp.path().join("a.log"), vec![0u8; 10]).unwrap();
        fs::write(sub.join("b.log"), vec![0u8; 20]).unwrap();

        let sizer = DirectorySizer::new(temp.path());
        assert_eq!(sizer.walk().unwrap(), 30);
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().unwrap();
        let sizer = DirectorySizer::new(temp.path().join("absent"));
        assert!(sizer.walk().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn hard_links_count_once_each() {
        let temp = tempdir().unwrap();
        let original = temp.path().join("outside.log");
        fs::write(&original, vec![0u8; 64]).unwrap();

        let watched = temp.path().join("cdc_raw");
        fs::create_dir(&watched).unwrap();
        fs::hard_link(&original, watched.join("outside.log")).unwrap();

        let sizer = DirectorySizer::new(&watched);
        assert_eq!(sizer.walk().unwrap(), 64);
    }
}
