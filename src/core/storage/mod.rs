//! Filesystem primitives for the export queue
//!
//! A [`Directory`] holds one telemetry signal's queued batches, each stored in
//! a [`File`]. Neither type owns what it points at: the OS or quota eviction
//! may remove a file between any two calls, so callers must treat
//! [`StorageError::is_not_found`](crate::error::StorageError::is_not_found) as
//! a skippable condition.

mod directory;
mod file;

pub use directory::Directory;
pub use file::File;
