//! S3 protocol translation for ShardStack, built on the s3s crate.
//!
//! [`ShardStackS3`] implements the [`s3s::S3`] trait as a thin translator
//! between the S3 wire surface and the
//! [`Filesystem`](shardstack_fs::Filesystem) facade: bucket CRUD, bucket
//! ACLs, whole-object get/put/head, and marker-paginated listings. The
//! interesting behavior (quorum, reconstruction, continuation) lives in
//! the storage core; nothing here does more than validate, delegate, and
//! shape DTOs.
//!
//! # Architecture
//!
//! ```text
//! s3s HTTP layer (routing, XML, SigV4)
//!        |
//!        v
//! ShardStackS3 (s3s::S3 trait impl)
//!        |
//!        v
//!   Filesystem facade (buckets, objects, listings)
//!        |
//!        v
//!   StorageBackend (posix disk or erasure pool)
//! ```

pub mod config;
pub mod error;
mod ops;
pub mod provider;

pub use config::ServerConfig;
pub use provider::ShardStackS3;
