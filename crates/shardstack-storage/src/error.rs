//! Structured storage errors.
//!
//! Defines [`StorageError`], the error type shared by the disk backends, the
//! erasure object store, and the filesystem facade. Each variant carries the
//! context needed to translate it into an S3 wire error at the outermost
//! layer; there is no exception-like control flow anywhere in between, every
//! boundary returns an explicit outcome.

/// Storage error taxonomy.
///
/// Variants are grouped by kind: validation, not-found, conflict, quorum,
/// corruption, and transport. The S3 translator maps each variant to a wire
/// error code through a fixed table.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------
    /// The volume name violates the naming rules.
    #[error("invalid volume name {name:?}: {reason}")]
    InvalidVolumeName {
        /// The offending volume name.
        name: String,
        /// The rule that was violated.
        reason: String,
    },

    /// The object path violates the path rules.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// The rule that was violated.
        reason: String,
    },

    /// A request argument is invalid (bad offset, bad delimiter, bad marker).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Not found
    // -----------------------------------------------------------------------
    /// The volume does not exist.
    #[error("volume not found: {volume}")]
    VolumeNotFound {
        /// The missing volume.
        volume: String,
    },

    /// The file does not exist.
    #[error("file not found: {volume}/{path}")]
    FileNotFound {
        /// The volume that was searched.
        volume: String,
        /// The missing path.
        path: String,
    },

    // -----------------------------------------------------------------------
    // Conflict
    // -----------------------------------------------------------------------
    /// The volume already exists.
    #[error("volume already exists: {volume}")]
    VolumeExists {
        /// The conflicting volume.
        volume: String,
    },

    /// The volume still contains entries and cannot be deleted.
    #[error("volume not empty: {volume}")]
    VolumeNotEmpty {
        /// The non-empty volume.
        volume: String,
    },

    // -----------------------------------------------------------------------
    // Quorum
    // -----------------------------------------------------------------------
    /// Fewer disks than `read_quorum` agree on the highest metadata version.
    #[error("read quorum not met for {volume}/{path}: {have} of {need} disks")]
    ReadQuorum {
        /// The volume being read.
        volume: String,
        /// The path being read.
        path: String,
        /// Disks found at the highest version.
        have: usize,
        /// Disks required.
        need: usize,
    },

    /// Fewer disks than `write_quorum` acknowledged a commit.
    #[error("write quorum not met for {volume}/{path}: {have} of {need} disks")]
    WriteQuorum {
        /// The volume being written.
        volume: String,
        /// The path being written.
        path: String,
        /// Disks that acknowledged.
        have: usize,
        /// Disks required.
        need: usize,
    },

    // -----------------------------------------------------------------------
    // Corruption
    // -----------------------------------------------------------------------
    /// Shard data is damaged beyond what the parity can repair.
    #[error("data corrupted at {volume}/{path}: {reason}")]
    Corrupted {
        /// The affected volume.
        volume: String,
        /// The affected path.
        path: String,
        /// What was detected.
        reason: String,
    },

    /// The per-object metadata file is present but unusable.
    #[error("invalid metadata for {volume}/{path}: {reason}")]
    InvalidMetadata {
        /// The affected volume.
        volume: String,
        /// The affected path.
        path: String,
        /// What failed to parse.
        reason: String,
    },

    // -----------------------------------------------------------------------
    // Resource limits
    // -----------------------------------------------------------------------
    /// Free disk space fell below the configured minimum.
    #[error("disk full: free space below the configured minimum on {disk}")]
    DiskFull {
        /// The disk root that ran out of space.
        disk: String,
    },

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------
    /// Backend I/O error not otherwise classified.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for the not-found variants, which the S3 layer renders as 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::VolumeNotFound { .. } | StorageError::FileNotFound { .. }
        )
    }
}

impl From<StorageError> for std::io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_classify_not_found_variants() {
        let err = StorageError::VolumeNotFound {
            volume: "bucket".to_owned(),
        };
        assert!(err.is_not_found());

        let err = StorageError::FileNotFound {
            volume: "bucket".to_owned(),
            path: "a/b".to_owned(),
        };
        assert!(err.is_not_found());

        let err = StorageError::VolumeExists {
            volume: "bucket".to_owned(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_should_preserve_io_error_through_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::from(io);
        let back: std::io::Error = err.into();
        assert_eq!(back.kind(), std::io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_should_render_quorum_error_with_counts() {
        let err = StorageError::ReadQuorum {
            volume: "vol".to_owned(),
            path: "obj".to_owned(),
            have: 3,
            need: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 of 5"));
        assert!(msg.contains("vol/obj"));
    }
}
