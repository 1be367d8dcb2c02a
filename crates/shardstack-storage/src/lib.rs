//! Disk-level storage for ShardStack.
//!
//! This crate defines the [`StorageBackend`] contract: a single disk-level
//! namespace of named volumes, each a flat key-to-bytes store. It also holds
//! the POSIX filesystem implementation and the structured error taxonomy
//! shared by every layer above it.
//!
//! The same contract is implemented by [`PosixBackend`] for a local disk and
//! by the erasure object store one crate up, so higher layers never care
//! whether they are talking to one disk or a pool of them.

pub mod backend;
pub mod error;
pub mod posix;
pub mod types;
pub mod validate;

pub use backend::{FileReader, FileWriter, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use posix::{MinFreeDisk, PosixBackend};
pub use types::{FileEntry, FileInfo, ListPage, VolInfo};
