//! The disk-level storage contract.
//!
//! [`StorageBackend`] models one disk-level namespace: named volumes, each a
//! flat key-to-bytes store. The contract is identical whether the implementor
//! is a local filesystem directory ([`crate::PosixBackend`]) or an erasure
//! pool presenting itself as a single logical disk, which is what lets the
//! filesystem facade stay agnostic of the storage topology.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::StorageResult;
use crate::types::{FileInfo, ListPage, VolInfo};

/// A sequential file reader positioned at the requested offset.
pub type FileReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// An append-only, close-commit file writer.
///
/// Bytes appended before a successful [`commit`](FileWriter::commit) may be
/// visible to readers but are not committed; a writer that is dropped or
/// [`abort`](FileWriter::abort)ed leaves the file uncommitted. Callers must
/// finish every writer with exactly one of `commit` or `abort`.
#[async_trait]
pub trait FileWriter: Send {
    /// Append bytes at the end of the file.
    async fn append(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Flush and commit the file. Consumes the writer.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discard the file, removing anything already written.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// A single disk-level namespace of volumes and files.
///
/// All operations validate their volume and path arguments and return a
/// structured [`crate::StorageError`]. Implementations are thread-safe for
/// concurrent operations on distinct paths; concurrent access to the same
/// path is serialized by the namespace locks one layer up.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Create a volume.
    async fn make_vol(&self, volume: &str) -> StorageResult<()>;

    /// Delete an empty volume.
    async fn delete_vol(&self, volume: &str) -> StorageResult<()>;

    /// List all volumes in lexicographic order.
    async fn list_vols(&self) -> StorageResult<Vec<VolInfo>>;

    /// Stat a volume.
    async fn stat_vol(&self, volume: &str) -> StorageResult<VolInfo>;

    /// Open an append-only writer for a new file, replacing any existing
    /// file at the path. Parent directories are created as needed.
    async fn create_file(&self, volume: &str, path: &str)
        -> StorageResult<Box<dyn FileWriter>>;

    /// Open a sequential reader positioned at `offset`.
    async fn read_file(
        &self,
        volume: &str,
        path: &str,
        offset: u64,
    ) -> StorageResult<FileReader>;

    /// Stat a file.
    async fn stat_file(&self, volume: &str, path: &str) -> StorageResult<FileInfo>;

    /// Delete a file, pruning parent directories that become empty.
    async fn delete_file(&self, volume: &str, path: &str) -> StorageResult<()>;

    /// List up to `max_entries` entries whose names start with `prefix` and
    /// are strictly greater than `marker`, in lexicographic order.
    ///
    /// With `recursive` set the walk descends depth-first and yields only
    /// files; otherwise it stays one level below the prefix directory and
    /// yields files and directories (directory names carry a trailing `/`).
    async fn list_files(
        &self,
        volume: &str,
        prefix: &str,
        marker: &str,
        recursive: bool,
        max_entries: usize,
    ) -> StorageResult<ListPage>;
}
