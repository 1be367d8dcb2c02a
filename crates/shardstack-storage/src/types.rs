//! Data types shared across the storage layers.

use chrono::{DateTime, Utc};

/// Information about a volume (bucket-equivalent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolInfo {
    /// Volume name.
    pub name: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

/// Information about a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Logical size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Hex MD5 of the content, when the backend records one.
    pub etag: Option<String>,
}

/// One entry produced by a listing.
///
/// Directory entries carry a trailing `/` in their name; everything else is
/// a file. Names are always relative to the volume root and use `/` as the
/// separator regardless of platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Entry name relative to the volume root.
    pub name: String,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
}

impl FileEntry {
    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries in lexicographic order, all strictly greater than the
    /// requested marker.
    pub entries: Vec<FileEntry>,
    /// True when the walk is exhausted; the last entry's name is the marker
    /// for the next page otherwise.
    pub eof: bool,
}
