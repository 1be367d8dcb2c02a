//! Storage-to-S3 error translation.
//!
//! One fixed table maps every [`StorageError`] variant to an
//! [`s3s::S3ErrorCode`]; there is no other path from the storage core to a
//! wire error. Quorum and corruption failures additionally emit a distinct
//! log event before collapsing into `InternalError`.

use s3s::{S3Error, S3ErrorCode};
use shardstack_storage::StorageError;
use tracing::error;

/// Convert a storage error into an s3s wire error.
#[must_use]
pub fn to_s3_error(err: StorageError) -> S3Error {
    let code = match &err {
        StorageError::InvalidVolumeName { .. } => S3ErrorCode::InvalidBucketName,
        StorageError::InvalidPath { .. } | StorageError::InvalidArgument { .. } => {
            S3ErrorCode::InvalidArgument
        }
        StorageError::VolumeNotFound { .. } => S3ErrorCode::NoSuchBucket,
        StorageError::FileNotFound { .. } => S3ErrorCode::NoSuchKey,
        StorageError::VolumeExists { .. } => S3ErrorCode::BucketAlreadyExists,
        StorageError::VolumeNotEmpty { .. } => S3ErrorCode::BucketNotEmpty,
        StorageError::ReadQuorum { .. } | StorageError::WriteQuorum { .. } => {
            error!(error = %err, "quorum failure");
            S3ErrorCode::InternalError
        }
        StorageError::Corrupted { .. } | StorageError::InvalidMetadata { .. } => {
            error!(error = %err, "data corruption");
            S3ErrorCode::InternalError
        }
        StorageError::DiskFull { .. } => {
            error!(error = %err, "disk full");
            S3ErrorCode::InternalError
        }
        StorageError::Io(_) => S3ErrorCode::InternalError,
    };
    S3Error::with_message(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(err: StorageError) -> S3ErrorCode {
        to_s3_error(err).code().clone()
    }

    #[test]
    fn test_should_map_not_found_errors_to_404_codes() {
        assert_eq!(
            code_of(StorageError::VolumeNotFound {
                volume: "b".into()
            }),
            S3ErrorCode::NoSuchBucket
        );
        assert_eq!(
            code_of(StorageError::FileNotFound {
                volume: "b".into(),
                path: "k".into()
            }),
            S3ErrorCode::NoSuchKey
        );
    }

    #[test]
    fn test_should_map_conflicts() {
        assert_eq!(
            code_of(StorageError::VolumeExists {
                volume: "b".into()
            }),
            S3ErrorCode::BucketAlreadyExists
        );
        assert_eq!(
            code_of(StorageError::VolumeNotEmpty {
                volume: "b".into()
            }),
            S3ErrorCode::BucketNotEmpty
        );
    }

    #[test]
    fn test_should_map_validation_errors() {
        assert_eq!(
            code_of(StorageError::InvalidVolumeName {
                name: "B".into(),
                reason: "upper".into()
            }),
            S3ErrorCode::InvalidBucketName
        );
        assert_eq!(
            code_of(StorageError::InvalidArgument {
                message: "bad delimiter".into()
            }),
            S3ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn test_should_collapse_quorum_and_corruption_to_internal_error() {
        assert_eq!(
            code_of(StorageError::ReadQuorum {
                volume: "b".into(),
                path: "k".into(),
                have: 2,
                need: 3
            }),
            S3ErrorCode::InternalError
        );
        assert_eq!(
            code_of(StorageError::Corrupted {
                volume: "b".into(),
                path: "k".into(),
                reason: "bad".into()
            }),
            S3ErrorCode::InternalError
        );
    }

    #[test]
    fn test_should_keep_error_message_in_wire_error() {
        let err = to_s3_error(StorageError::VolumeNotFound {
            volume: "my-bucket".into(),
        });
        assert!(err.message().is_some_and(|m| m.contains("my-bucket")));
    }
}
