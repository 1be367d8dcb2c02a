//! Bucket and object operations over a storage backend.
//!
//! [`Filesystem`] is the layer the S3 translator talks to. It validates
//! names, maps volumes to buckets and files to objects, keeps canned bucket
//! ACLs, and runs the paginated listing state machine: a listing call pulls
//! entries from a walker (popped from the continuation cache, or freshly
//! spawned) and parks it again under the marker the next page will
//! present.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use percent_encoding::percent_decode_str;
use tracing::debug;

use shardstack_storage::validate::check_prefix;
use shardstack_storage::{
    FileReader, FileWriter, StorageBackend, StorageError, StorageResult,
};

use crate::acl::BucketAcl;
use crate::list_cache::{ListCache, ListParams};
use crate::walker::Walker;

/// Most keys a single listing call will return.
pub const LIST_OBJECTS_LIMIT: usize = 1000;

/// Name fragments that mark internal state; never surfaced in listings.
const RESERVED_NAMES: [&str; 2] = ["$multiparts", "$tmpobject"];

/// Information about one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

/// Information about one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub name: String,
    /// Logical size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Hex MD5 of the content, when the backend records one.
    pub etag: Option<String>,
}

/// Parameters of one `ListObjects` call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsQuery {
    /// Key prefix filter.
    pub prefix: String,
    /// Resume strictly after this (URL-escaped) key.
    pub marker: String,
    /// `""` for a deep listing, `"/"` for one level.
    pub delimiter: String,
    /// Most keys to return.
    pub max_keys: usize,
}

/// One page of `ListObjects` results.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsResult {
    /// Objects, in key order.
    pub objects: Vec<ObjectInfo>,
    /// Common prefixes when a delimiter is in effect.
    pub prefixes: Vec<String>,
    /// Whether more keys remain.
    pub is_truncated: bool,
    /// Marker for the next page when truncated.
    pub next_marker: Option<String>,
}

/// Bucket/object facade over a single disk or an erasure pool.
pub struct Filesystem {
    backend: Arc<dyn StorageBackend>,
    list_cache: ListCache,
    acls: DashMap<String, BucketAcl>,
}

impl std::fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("backend", &self.backend)
            .field("parked_walkers", &self.list_cache.len())
            .finish()
    }
}

impl Filesystem {
    /// Facade with the default continuation-cache configuration.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_list_cache(backend, ListCache::new())
    }

    /// Facade with an explicit continuation cache.
    #[must_use]
    pub fn with_list_cache(backend: Arc<dyn StorageBackend>, list_cache: ListCache) -> Self {
        Self {
            backend,
            list_cache,
            acls: DashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Create a bucket.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidVolumeName`] or [`StorageError::VolumeExists`].
    pub async fn make_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.backend.make_vol(bucket).await?;
        debug!(bucket, "created bucket");
        Ok(())
    }

    /// Delete an empty bucket.
    ///
    /// # Errors
    ///
    /// [`StorageError::VolumeNotFound`] or [`StorageError::VolumeNotEmpty`].
    pub async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.backend.delete_vol(bucket).await?;
        self.acls.remove(bucket);
        debug!(bucket, "deleted bucket");
        Ok(())
    }

    /// Stat a bucket.
    pub async fn bucket_info(&self, bucket: &str) -> StorageResult<BucketInfo> {
        let vol = self.backend.stat_vol(bucket).await?;
        Ok(BucketInfo {
            name: vol.name,
            created: vol.created,
        })
    }

    /// All buckets in name order.
    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let vols = self.backend.list_vols().await?;
        Ok(vols
            .into_iter()
            .map(|vol| BucketInfo {
                name: vol.name,
                created: vol.created,
            })
            .collect())
    }

    /// Set a bucket's canned ACL.
    pub async fn set_bucket_acl(&self, bucket: &str, acl: &str) -> StorageResult<()> {
        self.backend.stat_vol(bucket).await?;
        let acl = BucketAcl::from_str(acl)?;
        self.acls.insert(bucket.to_owned(), acl);
        debug!(bucket, acl = %acl, "set bucket acl");
        Ok(())
    }

    /// A bucket's canned ACL; `private` when never set.
    pub async fn get_bucket_acl(&self, bucket: &str) -> StorageResult<BucketAcl> {
        self.backend.stat_vol(bucket).await?;
        Ok(self
            .acls
            .get(bucket)
            .map(|entry| *entry.value())
            .unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Open an append-only, close-commit writer for a new object.
    pub async fn create_object(
        &self,
        bucket: &str,
        object: &str,
    ) -> StorageResult<Box<dyn FileWriter>> {
        self.backend.stat_vol(bucket).await?;
        self.backend.create_file(bucket, object).await
    }

    /// Stat an object.
    pub async fn stat_object(&self, bucket: &str, object: &str) -> StorageResult<ObjectInfo> {
        self.backend.stat_vol(bucket).await?;
        let info = self.backend.stat_file(bucket, object).await?;
        Ok(ObjectInfo {
            bucket: bucket.to_owned(),
            name: object.to_owned(),
            size: info.size,
            mod_time: info.mod_time,
            etag: info.etag,
        })
    }

    /// Open an object for sequential reading from `offset`.
    ///
    /// Returns the object's info alongside the reader so callers can shape
    /// their response headers without a second stat.
    pub async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        offset: u64,
    ) -> StorageResult<(ObjectInfo, FileReader)> {
        let info = self.stat_object(bucket, object).await?;
        let reader = self.backend.read_file(bucket, object, offset).await?;
        Ok((info, reader))
    }

    /// Delete an object.
    pub async fn delete_object(&self, bucket: &str, object: &str) -> StorageResult<()> {
        self.backend.stat_vol(bucket).await?;
        self.backend.delete_file(bucket, object).await
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// List up to `max_keys` objects and common prefixes.
    ///
    /// Continuation state is cached: a truncated call parks its walker under
    /// the returned `next_marker`, and the follow-up call resumes it instead
    /// of restarting the walk.
    ///
    /// # Errors
    ///
    /// Validation failures surface as [`StorageError::InvalidArgument`]
    /// (unsupported delimiter, marker/prefix mismatch, undecodable marker)
    /// or [`StorageError::InvalidPath`] (bad prefix).
    pub async fn list_objects(
        &self,
        bucket: &str,
        query: ListObjectsQuery,
    ) -> StorageResult<ListObjectsResult> {
        self.backend.stat_vol(bucket).await?;
        check_prefix(&query.prefix)?;

        if !(query.delimiter.is_empty() || query.delimiter == "/") {
            return Err(StorageError::InvalidArgument {
                message: format!(
                    "delimiter {:?} is not supported, only \"/\" is",
                    query.delimiter
                ),
            });
        }

        let marker = percent_decode_str(&query.marker)
            .decode_utf8()
            .map_err(|e| StorageError::InvalidArgument {
                message: format!("undecodable marker: {e}"),
            })?
            .into_owned();
        if !marker.is_empty() && !marker.starts_with(&query.prefix) {
            return Err(StorageError::InvalidArgument {
                message: format!(
                    "marker {marker:?} does not fall under prefix {:?}",
                    query.prefix
                ),
            });
        }

        let mut result = ListObjectsResult::default();
        if query.max_keys == 0 {
            return Ok(result);
        }
        let max_keys = query.max_keys.min(LIST_OBJECTS_LIMIT);
        let recursive = query.delimiter.is_empty();

        let params = ListParams {
            bucket: bucket.to_owned(),
            delimiter: query.delimiter.clone(),
            marker: marker.clone(),
            prefix: query.prefix.clone(),
        };
        let mut walker = self.list_cache.pop(&params).unwrap_or_else(|| {
            Walker::spawn(
                Arc::clone(&self.backend),
                bucket.to_owned(),
                query.prefix.clone(),
                marker,
                recursive,
            )
        });

        let mut next_marker = String::new();
        let mut count = 0usize;
        while count < max_keys {
            let Some(entry) = walker.next().await else {
                // Walk exhausted; the walker is dropped, not parked.
                return Ok(result);
            };
            let entry = entry?;
            if RESERVED_NAMES.iter().any(|r| entry.name.contains(r)) {
                continue;
            }
            next_marker.clone_from(&entry.name);
            if entry.is_dir() {
                result.prefixes.push(entry.name);
            } else {
                result.objects.push(ObjectInfo {
                    bucket: bucket.to_owned(),
                    name: entry.name,
                    size: entry.size,
                    mod_time: entry.mod_time,
                    etag: None,
                });
            }
            count += 1;
        }

        result.is_truncated = true;
        result.next_marker = Some(next_marker.clone());
        self.list_cache.push(
            ListParams {
                marker: next_marker,
                ..params
            },
            walker,
        );
        Ok(result)
    }
}
