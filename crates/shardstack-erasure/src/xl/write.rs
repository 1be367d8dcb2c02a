//! The erasure write path.
//!
//! A writer holds the exclusive namespace lock for the whole operation.
//! Incoming bytes are buffered into erasure blocks; each block is split and
//! encoded, and shard `i` is appended to disk `i`'s `part.<i>` writer. Only
//! after every part commits does the writer publish `file.json` carrying
//! `version = previous + 1`, which is the commit point. A write that cannot reach
//! the full-pool write quorum fails, and whatever it left behind is shadowed
//! by the lower version and ignored by readers.

use async_trait::async_trait;
use bytes::BytesMut;
use md5::{Digest, Md5};
use std::sync::Arc;
use tracing::{debug, warn};

use shardstack_storage::{FileWriter, StorageBackend, StorageError, StorageResult};

use crate::codec::ErasureCodec;
use crate::meta::XlMeta;
use crate::nslock::NsWriteGuard;

use super::XlStore;

impl XlStore {
    /// Open an erasure writer for `volume/path`.
    ///
    /// Takes the exclusive namespace lock, probes the previous metadata
    /// version, and opens a part writer on every disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteQuorum`] when fewer than the full pool
    /// of part writers could be opened.
    pub(crate) async fn create_writer(
        &self,
        volume: &str,
        path: &str,
    ) -> StorageResult<XlFileWriter> {
        shardstack_storage::validate::check_volname(volume)?;
        shardstack_storage::validate::check_path(path)?;

        let guard = self.nslock.wlock(volume, path).await;

        let (versions, _) = self.probe_versions(volume, path).await;
        let previous = versions.iter().copied().max().unwrap_or(0).max(0);

        let mut writers: Vec<Option<Box<dyn FileWriter>>> =
            Vec::with_capacity(self.disks.len());
        let mut opened = 0usize;
        let mut vol_missing = 0usize;
        for (i, disk) in self.disks.iter().enumerate() {
            match disk.create_file(volume, &Self::part_path(path, i)).await {
                Ok(writer) => {
                    opened += 1;
                    writers.push(Some(writer));
                }
                Err(e) => {
                    if matches!(e, StorageError::VolumeNotFound { .. }) {
                        vol_missing += 1;
                    }
                    warn!(volume, path, disk = i, error = %e, "cannot open part writer");
                    writers.push(None);
                }
            }
        }
        if vol_missing == self.disks.len() {
            return Err(StorageError::VolumeNotFound {
                volume: volume.to_owned(),
            });
        }
        if opened < self.write_quorum {
            abort_writers(&mut writers).await;
            return Err(StorageError::WriteQuorum {
                volume: volume.to_owned(),
                path: path.to_owned(),
                have: opened,
                need: self.write_quorum,
            });
        }

        debug!(volume, path, version = previous + 1, "opened erasure writer");

        Ok(XlFileWriter {
            codec: Arc::clone(&self.codec),
            disks: self.disks.clone(),
            writers,
            block: BytesMut::with_capacity(self.block_size),
            block_size: self.block_size,
            size: 0,
            md5: Md5::new(),
            next_version: previous + 1,
            data_blocks: self.data_blocks,
            parity_blocks: self.parity_blocks,
            write_quorum: self.write_quorum,
            volume: volume.to_owned(),
            path: path.to_owned(),
            _guard: guard,
        })
    }
}

/// Append-only, close-commit writer for one erasure-coded object.
pub(crate) struct XlFileWriter {
    codec: Arc<ErasureCodec>,
    disks: Vec<Arc<dyn StorageBackend>>,
    writers: Vec<Option<Box<dyn FileWriter>>>,
    block: BytesMut,
    block_size: usize,
    size: u64,
    md5: Md5,
    next_version: i64,
    data_blocks: usize,
    parity_blocks: usize,
    write_quorum: usize,
    volume: String,
    path: String,
    _guard: NsWriteGuard,
}

impl XlFileWriter {
    /// Encode one erasure block and append each shard to its disk.
    async fn flush_block(&mut self, block: &[u8]) -> StorageResult<()> {
        let shards = self
            .codec
            .encode(block)
            .map_err(|e| StorageError::Corrupted {
                volume: self.volume.clone(),
                path: self.path.clone(),
                reason: format!("encode failed: {e}"),
            })?;

        let mut live = 0usize;
        for (i, slot) in self.writers.iter_mut().enumerate() {
            let Some(writer) = slot else { continue };
            match writer.append(&shards[i]).await {
                Ok(()) => live += 1,
                Err(e) => {
                    warn!(
                        volume = %self.volume,
                        path = %self.path,
                        disk = i,
                        error = %e,
                        "shard append failed"
                    );
                    if let Some(writer) = slot.take() {
                        let _ = writer.abort().await;
                    }
                }
            }
        }
        if live < self.write_quorum {
            return Err(StorageError::WriteQuorum {
                volume: self.volume.clone(),
                path: self.path.clone(),
                have: live,
                need: self.write_quorum,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FileWriter for XlFileWriter {
    async fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.md5.update(data);
        self.size += data.len() as u64;
        self.block.extend_from_slice(data);
        while self.block.len() >= self.block_size {
            let chunk = self.block.split_to(self.block_size);
            self.flush_block(&chunk).await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut this = *self;

        if !this.block.is_empty() {
            let chunk = this.block.split_to(this.block.len());
            this.flush_block(&chunk).await?;
        }

        // Commit every part writer first; the metadata below is what makes
        // the new version visible.
        let mut committed = vec![false; this.disks.len()];
        let mut parts_ok = 0usize;
        for (i, slot) in this.writers.iter_mut().enumerate() {
            let Some(writer) = slot.take() else { continue };
            match writer.commit().await {
                Ok(()) => {
                    committed[i] = true;
                    parts_ok += 1;
                }
                Err(e) => {
                    warn!(
                        volume = %this.volume,
                        path = %this.path,
                        disk = i,
                        error = %e,
                        "part commit failed"
                    );
                }
            }
        }
        if parts_ok < this.write_quorum {
            return Err(StorageError::WriteQuorum {
                volume: this.volume.clone(),
                path: this.path.clone(),
                have: parts_ok,
                need: this.write_quorum,
            });
        }

        let meta = XlMeta::new(
            this.size,
            this.next_version,
            this.data_blocks,
            this.parity_blocks,
            hex::encode(this.md5.finalize()),
        );
        let payload = serde_json::to_vec(&meta).map_err(|e| StorageError::InvalidMetadata {
            volume: this.volume.clone(),
            path: this.path.clone(),
            reason: e.to_string(),
        })?;

        let mut meta_ok = 0usize;
        for (i, disk) in this.disks.iter().enumerate() {
            if !committed[i] {
                continue;
            }
            match write_meta(disk, &this.volume, &this.path, &payload).await {
                Ok(()) => meta_ok += 1,
                Err(e) => {
                    warn!(
                        volume = %this.volume,
                        path = %this.path,
                        disk = i,
                        error = %e,
                        "metadata write failed"
                    );
                }
            }
        }
        if meta_ok < this.write_quorum {
            return Err(StorageError::WriteQuorum {
                volume: this.volume.clone(),
                path: this.path.clone(),
                have: meta_ok,
                need: this.write_quorum,
            });
        }

        debug!(
            volume = %this.volume,
            path = %this.path,
            size = this.size,
            version = this.next_version,
            "committed erasure object"
        );
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let mut this = *self;
        abort_writers(&mut this.writers).await;
        Ok(())
    }
}

/// Write `file.json` on one disk with close-commit semantics.
async fn write_meta(
    disk: &Arc<dyn StorageBackend>,
    volume: &str,
    path: &str,
    payload: &[u8],
) -> StorageResult<()> {
    let mut writer = disk
        .create_file(volume, &XlStore::meta_path(path))
        .await?;
    match writer.append(payload).await {
        Ok(()) => writer.commit().await,
        Err(e) => {
            let _ = writer.abort().await;
            Err(e)
        }
    }
}

/// Abort every remaining part writer, ignoring individual failures.
async fn abort_writers(writers: &mut [Option<Box<dyn FileWriter>>]) {
    for slot in writers.iter_mut() {
        if let Some(writer) = slot.take() {
            let _ = writer.abort().await;
        }
    }
}
