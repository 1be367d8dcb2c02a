//! The XL erasure object store.
//!
//! [`XlStore`] owns a fixed, ordered pool of N = data + parity disk
//! backends. A logical object at `volume/path` lives on every disk as a
//! directory holding `file.json` (metadata with a monotonic version) and
//! `part.<i>` (the shard for backend ordinal `i`). The store itself
//! implements [`StorageBackend`], squashing the pool into one logical disk.
//!
//! Reads go through a metadata version quorum: at least `read_quorum`
//! disks must agree on the highest version before shards are opened. Writes
//! commit shards first and metadata last, so a failed write leaves older
//! versions intact and readers simply never see it.

mod read;
mod write;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use shardstack_storage::validate::{check_path, check_prefix, check_volname};
use shardstack_storage::{
    FileEntry, FileInfo, FileReader, FileWriter, ListPage, StorageBackend, StorageError,
    StorageResult, VolInfo,
};

use crate::codec::ErasureCodec;
use crate::meta::{XlMeta, METADATA_FILE};
use crate::nslock::NsLockMap;

pub use read::ObjectReadStream;

/// Fixed erasure block size: encoding, verification, and reconstruction all
/// operate on 4 MiB windows of the object.
pub const ERASURE_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Page size used when walking a disk during listings.
const LIST_PAGE: usize = 1000;

/// Erasure-coded object store over an ordered pool of disks.
#[derive(Debug)]
pub struct XlStore {
    disks: Vec<Arc<dyn StorageBackend>>,
    codec: Arc<ErasureCodec>,
    data_blocks: usize,
    parity_blocks: usize,
    read_quorum: usize,
    write_quorum: usize,
    nslock: Arc<NsLockMap>,
    block_size: usize,
}

impl XlStore {
    /// Create a store over `disks`, which must be exactly
    /// `data_blocks + parity_blocks` backends in stable order.
    ///
    /// Read quorum is `data_blocks + 1`; write quorum is the full pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for a mismatched disk count
    /// or an invalid erasure geometry.
    pub fn new(
        disks: Vec<Arc<dyn StorageBackend>>,
        data_blocks: usize,
        parity_blocks: usize,
    ) -> StorageResult<Self> {
        let total = data_blocks + parity_blocks;
        if disks.len() != total {
            return Err(StorageError::InvalidArgument {
                message: format!(
                    "erasure geometry {data_blocks}+{parity_blocks} needs {total} disks, got {}",
                    disks.len()
                ),
            });
        }
        let codec = ErasureCodec::new(data_blocks, parity_blocks)?;
        Ok(Self {
            disks,
            codec: Arc::new(codec),
            data_blocks,
            parity_blocks,
            read_quorum: (data_blocks + 1).min(total),
            write_quorum: total,
            nslock: NsLockMap::new(),
            block_size: ERASURE_BLOCK_SIZE,
        })
    }

    /// Override the erasure block size. Objects must be read with the same
    /// block size they were written with.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// The namespace lock table serializing readers and writers per object.
    #[must_use]
    pub fn nslock(&self) -> &Arc<NsLockMap> {
        &self.nslock
    }

    /// Total disk count.
    #[must_use]
    pub fn disk_count(&self) -> usize {
        self.disks.len()
    }

    pub(crate) fn meta_path(path: &str) -> String {
        format!("{path}/{METADATA_FILE}")
    }

    pub(crate) fn part_path(path: &str, ordinal: usize) -> String {
        format!("{path}/part.{ordinal}")
    }

    /// Read and decode `file.json` for `path` from one disk.
    pub(crate) async fn read_meta_on(
        &self,
        disk: &Arc<dyn StorageBackend>,
        volume: &str,
        path: &str,
    ) -> StorageResult<XlMeta> {
        let mut reader = disk
            .read_file(volume, &Self::meta_path(path), 0)
            .await?;
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).await?;
        serde_json::from_slice(&raw).map_err(|e| StorageError::InvalidMetadata {
            volume: volume.to_owned(),
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Probe every disk's metadata version for `path`.
    ///
    /// Returns the per-ordinal versions (−1 for an unreachable disk or
    /// malformed metadata, 0 for metadata without a version key) and how
    /// many disks reported the object as absent.
    pub(crate) async fn probe_versions(&self, volume: &str, path: &str) -> (Vec<i64>, usize) {
        let mut versions = vec![-1i64; self.disks.len()];
        let mut absent = 0usize;
        for (i, disk) in self.disks.iter().enumerate() {
            match self.read_meta_on(disk, volume, path).await {
                Ok(meta) => versions[i] = meta.version().unwrap_or(-1),
                Err(e) if e.is_not_found() => absent += 1,
                Err(e) => {
                    trace!(volume, path, disk = i, error = %e, "metadata probe failed");
                }
            }
        }
        (versions, absent)
    }

    /// Compute the quorum set for `path`: the ordinals of every disk at the
    /// highest metadata version.
    ///
    /// # Errors
    ///
    /// - [`StorageError::FileNotFound`] when every disk reports the object
    ///   absent.
    /// - [`StorageError::ReadQuorum`] when fewer than `read_quorum` disks
    ///   carry the highest version.
    pub(crate) async fn quorum_disks(
        &self,
        volume: &str,
        path: &str,
    ) -> StorageResult<(Vec<usize>, i64)> {
        let (versions, absent) = self.probe_versions(volume, path).await;
        if absent == self.disks.len() {
            return Err(StorageError::FileNotFound {
                volume: volume.to_owned(),
                path: path.to_owned(),
            });
        }
        let highest = versions.iter().copied().max().unwrap_or(-1);
        if highest < 0 {
            return Err(StorageError::ReadQuorum {
                volume: volume.to_owned(),
                path: path.to_owned(),
                have: 0,
                need: self.read_quorum,
            });
        }
        // Quorum members keep their stable backend ordinal; decode uses it
        // to place shards into the N-wide codec input.
        let quorum: Vec<usize> = versions
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == highest)
            .map(|(i, _)| i)
            .collect();
        if quorum.len() < self.read_quorum {
            return Err(StorageError::ReadQuorum {
                volume: volume.to_owned(),
                path: path.to_owned(),
                have: quorum.len(),
                need: self.read_quorum,
            });
        }
        Ok((quorum, highest))
    }

    /// First disk that currently answers for `volume`; used for listings.
    async fn first_reachable(&self, volume: &str) -> StorageResult<&Arc<dyn StorageBackend>> {
        let mut last_err = None;
        for disk in &self.disks {
            match disk.stat_vol(volume).await {
                Ok(_) => return Ok(disk),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StorageError::VolumeNotFound {
            volume: volume.to_owned(),
        }))
    }
}

#[async_trait]
impl StorageBackend for XlStore {
    async fn make_vol(&self, volume: &str) -> StorageResult<()> {
        check_volname(volume)?;
        let mut created = 0usize;
        let mut exists = 0usize;
        let mut first_err = None;
        for (i, disk) in self.disks.iter().enumerate() {
            match disk.make_vol(volume).await {
                Ok(()) => created += 1,
                Err(StorageError::VolumeExists { .. }) => exists += 1,
                Err(e) => {
                    warn!(volume, disk = i, error = %e, "make_vol failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        if exists == self.disks.len() {
            return Err(StorageError::VolumeExists {
                volume: volume.to_owned(),
            });
        }
        match first_err {
            Some(e) if created + exists < self.write_quorum => Err(e),
            _ => Ok(()),
        }
    }

    async fn delete_vol(&self, volume: &str) -> StorageResult<()> {
        check_volname(volume)?;
        let mut missing = 0usize;
        let mut first_err = None;
        for (i, disk) in self.disks.iter().enumerate() {
            match disk.delete_vol(volume).await {
                Ok(()) => {}
                Err(StorageError::VolumeNotFound { .. }) => missing += 1,
                Err(e @ StorageError::VolumeNotEmpty { .. }) => return Err(e),
                Err(e) => {
                    warn!(volume, disk = i, error = %e, "delete_vol failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        if missing == self.disks.len() {
            return Err(StorageError::VolumeNotFound {
                volume: volume.to_owned(),
            });
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn list_vols(&self) -> StorageResult<Vec<VolInfo>> {
        let mut last_err = None;
        for disk in &self.disks {
            match disk.list_vols().await {
                Ok(vols) => return Ok(vols),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            StorageError::InvalidArgument {
                message: "no disks configured".to_owned(),
            }
        }))
    }

    async fn stat_vol(&self, volume: &str) -> StorageResult<VolInfo> {
        check_volname(volume)?;
        self.first_reachable(volume).await?.stat_vol(volume).await
    }

    async fn create_file(
        &self,
        volume: &str,
        path: &str,
    ) -> StorageResult<Box<dyn FileWriter>> {
        Ok(Box::new(self.create_writer(volume, path).await?))
    }

    async fn read_file(
        &self,
        volume: &str,
        path: &str,
        offset: u64,
    ) -> StorageResult<FileReader> {
        let stream = self.read_stream(volume, path, offset).await?;
        Ok(Box::new(stream.into_reader()))
    }

    async fn stat_file(&self, volume: &str, path: &str) -> StorageResult<FileInfo> {
        check_volname(volume)?;
        check_path(path)?;
        let _guard = self.nslock.rlock(volume, path).await;

        let (quorum, _) = self.quorum_disks(volume, path).await?;
        let meta = self
            .read_meta_on(&self.disks[quorum[0]], volume, path)
            .await?;
        let size = meta.size().ok_or_else(|| StorageError::InvalidMetadata {
            volume: volume.to_owned(),
            path: path.to_owned(),
            reason: "missing 'file.size'".to_owned(),
        })?;
        Ok(FileInfo {
            size,
            mod_time: meta.mod_time(),
            etag: meta.md5_sum().map(str::to_owned),
        })
    }

    async fn delete_file(&self, volume: &str, path: &str) -> StorageResult<()> {
        check_volname(volume)?;
        check_path(path)?;
        let _guard = self.nslock.wlock(volume, path).await;

        let mut found = false;
        for (i, disk) in self.disks.iter().enumerate() {
            for target in [Self::part_path(path, i), Self::meta_path(path)] {
                match disk.delete_file(volume, &target).await {
                    Ok(()) => found = true,
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        warn!(volume, path, disk = i, error = %e, "delete failed");
                    }
                }
            }
        }
        if !found {
            return Err(StorageError::FileNotFound {
                volume: volume.to_owned(),
                path: path.to_owned(),
            });
        }
        debug!(volume, path, "deleted erasure object");
        Ok(())
    }

    async fn list_files(
        &self,
        volume: &str,
        prefix: &str,
        marker: &str,
        recursive: bool,
        max_entries: usize,
    ) -> StorageResult<ListPage> {
        check_volname(volume)?;
        check_prefix(prefix)?;
        if max_entries == 0 {
            return Ok(ListPage {
                entries: Vec::new(),
                eof: false,
            });
        }

        let disk = self.first_reachable(volume).await?;
        let meta_suffix = format!("/{METADATA_FILE}");
        let mut entries = Vec::new();
        let mut raw_marker = marker.to_owned();

        loop {
            let page = disk
                .list_files(volume, prefix, &raw_marker, recursive, LIST_PAGE)
                .await?;
            for raw in &page.entries {
                raw_marker.clone_from(&raw.name);
                if recursive {
                    // Only metadata files mark objects; shard files are
                    // internal and everything else is a stray.
                    let Some(object) = raw.name.strip_suffix(&meta_suffix) else {
                        continue;
                    };
                    if !object.starts_with(prefix) || object <= marker {
                        continue;
                    }
                    match self.read_meta_on(disk, volume, object).await {
                        Ok(meta) => {
                            let Some(size) = meta.size() else {
                                warn!(volume, object, "object metadata missing size");
                                continue;
                            };
                            entries.push(FileEntry {
                                name: object.to_owned(),
                                size,
                                mod_time: meta.mod_time(),
                            });
                        }
                        Err(e) => {
                            warn!(volume, object, error = %e, "skipping unreadable object");
                            continue;
                        }
                    }
                } else {
                    if !raw.is_dir() {
                        // Loose files at this level are not objects.
                        continue;
                    }
                    let object = raw.name.trim_end_matches('/');
                    match self.read_meta_on(disk, volume, object).await {
                        Ok(meta) => {
                            // The directory is itself an object; squash it.
                            if object <= marker {
                                continue;
                            }
                            let Some(size) = meta.size() else {
                                continue;
                            };
                            entries.push(FileEntry {
                                name: object.to_owned(),
                                size,
                                mod_time: meta.mod_time(),
                            });
                        }
                        Err(e) if e.is_not_found() => {
                            // Plain directory: a common prefix.
                            if raw.name.as_str() <= marker {
                                continue;
                            }
                            entries.push(raw.clone());
                        }
                        Err(e) => {
                            warn!(volume, object, error = %e, "skipping unreadable entry");
                            continue;
                        }
                    }
                }
                if entries.len() == max_entries {
                    return Ok(ListPage {
                        entries,
                        eof: false,
                    });
                }
            }
            if page.eof {
                return Ok(ListPage { entries, eof: true });
            }
        }
    }
}

#[cfg(test)]
mod tests;
