//! Bucket/object filesystem facade for ShardStack.
//!
//! [`Filesystem`] turns a [`StorageBackend`](shardstack_storage::StorageBackend),
//! a single disk or an erasure pool, into bucket and object operations:
//! bucket CRUD, bucket ACLs, object create/read/stat/delete, and paginated,
//! delimiter-aware listings whose walk state survives across calls in a
//! bounded continuation cache.

pub mod acl;
pub mod facade;
pub mod list_cache;
pub mod walker;

pub use acl::BucketAcl;
pub use facade::{
    BucketInfo, Filesystem, ListObjectsQuery, ListObjectsResult, ObjectInfo, LIST_OBJECTS_LIMIT,
};
pub use list_cache::{ListCache, ListParams};
pub use walker::Walker;
