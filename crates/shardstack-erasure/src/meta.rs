//! Per-object erasure metadata (`file.json`).
//!
//! Every backend in the pool carries one `file.json` per object. All values
//! are decimal or RFC3339 strings; the format is external, so parsing is
//! defensive: a missing `file.version` means version 0, while a missing
//! `file.size` makes the metadata unusable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the per-object metadata file.
pub const METADATA_FILE: &str = "file.json";

/// Object metadata as stored on each disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlMeta {
    /// Total logical bytes, decimal string.
    #[serde(rename = "file.size", default, skip_serializing_if = "Option::is_none")]
    size: Option<String>,

    /// Monotonically increasing version, decimal string. Absent means 0.
    #[serde(
        rename = "file.version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    version: Option<String>,

    /// Last modification time, RFC3339. Informational.
    #[serde(
        rename = "file.modTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    mod_time: Option<String>,

    /// Data shard count at write time.
    #[serde(
        rename = "file.xlDataBlocks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    data_blocks: Option<String>,

    /// Parity shard count at write time.
    #[serde(
        rename = "file.xlParityBlocks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    parity_blocks: Option<String>,

    /// Hex MD5 of the full object. Informational.
    #[serde(
        rename = "file.md5Sum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    md5_sum: Option<String>,
}

impl XlMeta {
    /// Metadata for a freshly committed object.
    #[must_use]
    pub fn new(
        size: u64,
        version: i64,
        data_blocks: usize,
        parity_blocks: usize,
        md5_hex: String,
    ) -> Self {
        Self {
            size: Some(size.to_string()),
            version: Some(version.to_string()),
            mod_time: Some(Utc::now().to_rfc3339()),
            data_blocks: Some(data_blocks.to_string()),
            parity_blocks: Some(parity_blocks.to_string()),
            md5_sum: Some(md5_hex),
        }
    }

    /// The logical object size, or `None` when `file.size` is missing or
    /// not a number.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size.as_deref()?.parse().ok()
    }

    /// The metadata version. A missing key is version 0; an unparseable
    /// value is `None` and the disk is treated as faulty.
    #[must_use]
    pub fn version(&self) -> Option<i64> {
        match self.version.as_deref() {
            None => Some(0),
            Some(raw) => raw.parse().ok(),
        }
    }

    /// The recorded modification time, falling back to the epoch when the
    /// field is missing or malformed.
    #[must_use]
    pub fn mod_time(&self) -> DateTime<Utc> {
        self.mod_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }

    /// Data shard count recorded at write time.
    #[must_use]
    pub fn data_blocks(&self) -> Option<usize> {
        self.data_blocks.as_deref()?.parse().ok()
    }

    /// Parity shard count recorded at write time.
    #[must_use]
    pub fn parity_blocks(&self) -> Option<usize> {
        self.parity_blocks.as_deref()?.parse().ok()
    }

    /// Hex MD5 of the object, when recorded.
    #[must_use]
    pub fn md5_sum(&self) -> Option<&str> {
        self.md5_sum.as_deref()
    }
}
