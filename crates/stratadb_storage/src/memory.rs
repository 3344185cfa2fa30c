//! In-memory segment writer for testing.

use crate::error::{StorageError, StorageResult};
use crate::writer::SegmentWriter;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory segment writer.
///
/// This writer stores all data in memory and is suitable for:
/// - Unit tests
/// - Ephemeral segments that don't need persistence
///
/// # Thread Safety
///
/// This writer is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use stratadb_storage::{SegmentWriter, InMemorySegmentWriter};
///
/// let writer = InMemorySegmentWriter::new(64);
/// let offset = writer.allocate(9).unwrap().unwrap();
/// writer.write_at(offset, b"test data").unwrap();
/// assert_eq!(writer.on_disk_size(), 9);
/// ```
#[derive(Debug)]
pub struct InMemorySegmentWriter {
    data: RwLock<Vec<u8>>,
    capacity: u64,
    allocated: AtomicU64,
    closed: AtomicBool,
}

impl InMemorySegmentWriter {
    /// Creates a new empty in-memory writer with the given capacity.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            capacity,
            allocated: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns a copy of all data written so far.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl SegmentWriter for InMemorySegmentWriter {
    fn allocate(&self, len: u32) -> StorageResult<Option<u64>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }

        let len = u64::from(len);
        let mut current = self.allocated.load(Ordering::Relaxed);
        loop {
            if current + len > self.capacity {
                return Ok(None);
            }
            match self.allocated.compare_exchange_weak(
                current,
                current + len,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(Some(current)),
                Err(observed) => current = observed,
            }
        }
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }

        let allocated = self.allocated.load(Ordering::Acquire);
        let end = offset.saturating_add(data.len() as u64);
        if end > allocated {
            return Err(StorageError::WriteOutOfBounds {
                offset,
                len: data.len(),
                allocated,
            });
        }

        let mut buffer = self.data.write();
        let end = end as usize;
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn on_disk_size(&self) -> u64 {
        self.allocated.load(Ordering::Acquire)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn sync(&self) -> StorageResult<()> {
        // In-memory writer has nothing to sync
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
