//! Erasure-coded object store for ShardStack.
//!
//! An object written through this crate is stored as one metadata file plus
//! N shard files spread across a fixed, ordered pool of
//! [`StorageBackend`](shardstack_storage::StorageBackend)s. Reads survive
//! partial failure by combining a per-disk metadata version quorum with
//! Reed–Solomon reconstruction inside a streaming, pipelined decode loop.
//!
//! The store itself implements `StorageBackend`, so the layers above treat
//! the whole pool as one logical disk.

pub mod codec;
pub mod meta;
pub mod nslock;
pub mod xl;

pub use codec::ErasureCodec;
pub use meta::{XlMeta, METADATA_FILE};
pub use nslock::{NsLockMap, NsReadGuard, NsWriteGuard};
pub use xl::{ObjectReadStream, XlStore, ERASURE_BLOCK_SIZE};
