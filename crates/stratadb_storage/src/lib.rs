//! # StrataDB Storage
//!
//! Segment writer trait and implementations for the StrataDB commit log.
//!
//! This crate provides the lowest-level storage abstraction for the commit
//! log. Segment writers are **bounded, append-only byte extents** - they
//! hand out offset reservations and accept writes into them, but do not
//! interpret the data.
//!
//! ## Design Principles
//!
//! - Writers reserve space without blocking; a full segment answers `None`
//! - No knowledge of commit-log entry formats or CDC semantics
//! - Must be `Send + Sync` for concurrent writer threads
//! - The commit log owns all format interpretation
//!
//! ## Available Writers
//!
//! - [`InMemorySegmentWriter`] - For testing and ephemeral segments
//! - [`FileSegmentWriter`] - For persistent segments using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use stratadb_storage::{SegmentWriter, InMemorySegmentWriter};
//!
//! let writer = InMemorySegmentWriter::new(1024);
//! let offset = writer.allocate(11).unwrap().unwrap();
//! writer.write_at(offset, b"hello world").unwrap();
//! assert_eq!(writer.on_disk_size(), 11);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod writer;

pub use error::{StorageError, StorageResult};
pub use file::FileSegmentWriter;
pub use memory::InMemorySegmentWriter;
pub use writer::SegmentWriter;
