//! # StrataDB Commit Log
//!
//! Commit-log segment allocation for StrataDB, with bounded-budget
//! Change-Data-Capture support.
//!
//! This crate provides:
//! - Append-only segment management with serialized hand-off
//! - A standard allocator for nodes without CDC
//! - A CDC-aware allocator that admits or rejects tracked writes against a
//!   configured on-disk budget
//! - Asynchronous CDC directory size tracking that never blocks writers
//!
//! ## Write path
//!
//! A writer thread submits a [`Mutation`] to the allocator. The allocator
//! reserves space in the active segment, or drives a hand-off to a fresh
//! segment when the active one is full. When the mutation is tracked by CDC
//! and the budget is exhausted, the write fails with
//! [`CommitLogError::CdcWriteRejected`] rather than silently dropping data
//! or stalling.
//!
//! ```no_run
//! use stratadb_commitlog::{allocator, Config, Mutation};
//!
//! # fn main() -> Result<(), stratadb_commitlog::CommitLogError> {
//! let config = Config::new("/var/lib/stratadb/commitlog", "/var/lib/stratadb/cdc_raw")
//!     .cdc_enabled(true)
//!     .cdc_total_space_mb(4096);
//!
//! let allocator = allocator::open(config)?;
//! let mutation = Mutation::cdc_tracked("orders", vec![1, 2, 3]);
//! let reservation = allocator.allocate(&mutation, mutation.serialized_size())?;
//! # let _ = reservation;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod cdc;
pub mod config;
pub mod dir;
pub mod error;
pub mod manager;
pub mod mutation;
pub mod segment;
mod util;

pub use allocator::{SegmentAllocator, StandardAllocator};
pub use cdc::{CdcAllocator, CdcLinkManager, CdcSizeTracker, DirectorySizer};
pub use config::Config;
pub use dir::CommitLogDir;
pub use error::{CommitLogError, CommitLogResult};
pub use manager::{SegmentManager, SegmentSource};
pub use mutation::{Mutation, ENTRY_OVERHEAD};
pub use segment::{CdcState, Reservation, Segment};
