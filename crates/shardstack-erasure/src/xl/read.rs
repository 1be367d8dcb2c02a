//! The erasure read path.
//!
//! A read snapshots the metadata version quorum under a shared namespace
//! lock, opens the quorum disks' shard files at the translated shard offset,
//! and hands everything to one producer task. The producer decodes erasure
//! blocks in logical offset order into a bounded pipe; backpressure is the
//! pipe's `full` condition and consumer cancellation is its close signal.
//! The shared lock travels with the producer, so it is released exactly when
//! the stream finishes, fails, or is dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::{debug, trace, warn};

use shardstack_storage::validate::{check_path, check_volname};
use shardstack_storage::{FileReader, StorageBackend, StorageError, StorageResult};

use crate::codec::ErasureCodec;
use crate::nslock::NsReadGuard;

use super::XlStore;

/// Erasure blocks buffered between the producer and the consumer.
const PIPE_DEPTH: usize = 4;

/// Decoded object bytes, in logical offset order.
///
/// Either the full requested range is produced followed by a clean end of
/// stream, or a terminal error item surfaces; never a silent truncation.
/// Dropping the stream cancels the producer on its next send.
pub struct ObjectReadStream {
    rx: mpsc::Receiver<StorageResult<Bytes>>,
}

impl Stream for ObjectReadStream {
    type Item = StorageResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl ObjectReadStream {
    /// Adapt the stream into an `AsyncRead`.
    #[must_use]
    pub fn into_reader(self) -> impl AsyncRead + Send + Sync + Unpin {
        StreamReader::new(self)
    }
}

impl XlStore {
    /// Stream `size − offset` decoded bytes of `volume/path`.
    ///
    /// `offset` must be a multiple of the erasure block size and at most the
    /// object size. A shared namespace lock is held until the returned
    /// stream completes, errors, or is dropped.
    ///
    /// # Errors
    ///
    /// Fails up front on validation, quorum, metadata, or shard-open
    /// problems; decode failures after that surface as stream items.
    pub async fn read_stream(
        &self,
        volume: &str,
        path: &str,
        offset: u64,
    ) -> StorageResult<ObjectReadStream> {
        check_volname(volume)?;
        check_path(path)?;
        let block_size = self.block_size as u64;
        if offset % block_size != 0 {
            return Err(StorageError::InvalidArgument {
                message: format!(
                    "offset {offset} is not aligned to the {block_size}-byte erasure block"
                ),
            });
        }

        let guard = self.nslock.rlock(volume, path).await;

        let (quorum, version) = self.quorum_disks(volume, path).await?;
        let meta = self
            .read_meta_on(&self.disks[quorum[0]], volume, path)
            .await?;
        let size = meta.size().ok_or_else(|| StorageError::InvalidMetadata {
            volume: volume.to_owned(),
            path: path.to_owned(),
            reason: "missing 'file.size'".to_owned(),
        })?;
        if offset > size {
            return Err(StorageError::InvalidArgument {
                message: format!("offset {offset} beyond object size {size}"),
            });
        }

        let (tx, rx) = mpsc::channel(PIPE_DEPTH);
        let total = size - offset;
        if total == 0 {
            // Nothing to produce; the stream ends cleanly right away.
            return Ok(ObjectReadStream { rx });
        }

        // Each full block before the offset contributed one fixed-length
        // stripe to every shard file.
        let shard_offset = offset / block_size * self.codec.shard_len(self.block_size) as u64;

        let mut readers: Vec<Option<FileReader>> =
            (0..self.disks.len()).map(|_| None).collect();
        // Decoding needs data_blocks readable shards; anything beyond that
        // many open failures is unrecoverable up front.
        let allowed_failures = quorum.len() - self.data_blocks;
        let mut failures = 0usize;
        for &ordinal in &quorum {
            let part = Self::part_path(path, ordinal);
            match open_shard(&self.disks[ordinal], volume, &part, shard_offset).await {
                Ok(reader) => readers[ordinal] = Some(reader),
                Err(e) => {
                    failures += 1;
                    warn!(volume, path, disk = ordinal, error = %e, "cannot open shard");
                    if failures > allowed_failures {
                        return Err(e);
                    }
                }
            }
        }

        debug!(
            volume,
            path,
            version,
            quorum = quorum.len(),
            size,
            offset,
            "starting erasure read"
        );

        tokio::spawn(produce(
            Arc::clone(&self.codec),
            readers,
            tx,
            total,
            self.block_size,
            volume.to_owned(),
            path.to_owned(),
            guard,
        ));

        Ok(ObjectReadStream { rx })
    }
}

/// Open one shard reader, retrying a transport failure once.
async fn open_shard(
    disk: &Arc<dyn StorageBackend>,
    volume: &str,
    part: &str,
    offset: u64,
) -> StorageResult<FileReader> {
    match disk.read_file(volume, part, offset).await {
        Err(StorageError::Io(e)) => {
            trace!(volume, part, error = %e, "retrying shard open");
            disk.read_file(volume, part, offset).await
        }
        other => other,
    }
}

/// The pipelined decode loop.
///
/// Runs until the requested range is produced, a block is unrecoverable, or
/// the consumer goes away. Holds the shared namespace lock for its whole
/// lifetime; every shard reader is dropped exactly once on exit.
#[allow(clippy::too_many_arguments)]
async fn produce(
    codec: Arc<ErasureCodec>,
    mut readers: Vec<Option<FileReader>>,
    tx: mpsc::Sender<StorageResult<Bytes>>,
    mut total_left: u64,
    block_size: usize,
    volume: String,
    path: String,
    _guard: NsReadGuard,
) {
    let corrupted = |reason: String| StorageError::Corrupted {
        volume: volume.clone(),
        path: path.clone(),
        reason,
    };

    while total_left > 0 {
        let cur_block_size = usize::try_from(total_left)
            .map_or(block_size, |left| left.min(block_size));
        let shard_len = codec.shard_len(cur_block_size);

        // Read this block's stripe from every live shard reader; a short
        // read or IO error drops the shard for the rest of the stream, it
        // is never retried.
        let mut shards: Vec<Option<Vec<u8>>> = vec![None; codec.total_shards()];
        for (ordinal, slot) in readers.iter_mut().enumerate() {
            let Some(reader) = slot else { continue };
            let mut buf = vec![0u8; shard_len];
            match reader.read_exact(&mut buf).await {
                Ok(_) => shards[ordinal] = Some(buf),
                Err(e) => {
                    warn!(volume = %volume, path = %path, disk = ordinal, error = %e, "shard read failed");
                    *slot = None;
                }
            }
        }

        if shards.iter().all(Option::is_none) {
            let _ = tx
                .send(Err(corrupted(
                    "all blocks are zero in length".to_owned(),
                )))
                .await;
            return;
        }

        if !codec.verify(&shards) {
            if let Err(e) = codec.reconstruct(&mut shards) {
                let _ = tx
                    .send(Err(corrupted(format!("unrecoverable block: {e}"))))
                    .await;
                return;
            }
            if !codec.verify(&shards) && !hunt_corrupted_shard(&codec, &mut shards) {
                let _ = tx
                    .send(Err(corrupted(
                        "verification failed after reconstruction".to_owned(),
                    )))
                    .await;
                return;
            }
            trace!(volume = %volume, path = %path, "block reconstructed");
        }

        let chunk = match codec.join(&shards, cur_block_size) {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(corrupted(format!("join failed: {e}")))).await;
                return;
            }
        };

        if tx.send(Ok(chunk)).await.is_err() {
            debug!(volume = %volume, path = %path, "consumer closed the stream");
            return;
        }
        total_left -= cur_block_size as u64;
    }
    // Dropping tx ends the pipe cleanly; dropping the guard releases the
    // namespace lock; dropping the readers closes every shard file.
}

/// Find and repair a single silently corrupted shard.
///
/// Reconstruction only fills missing shards, so bitrot leaves parity broken
/// with nothing to fill. Dropping each shard in turn and reconstructing it
/// from the rest identifies the damaged one: only the hypothesis that drops
/// the corrupted shard verifies afterwards.
fn hunt_corrupted_shard(codec: &ErasureCodec, shards: &mut Vec<Option<Vec<u8>>>) -> bool {
    for suspect in 0..shards.len() {
        let mut attempt = shards.clone();
        attempt[suspect] = None;
        if codec.reconstruct(&mut attempt).is_ok() && codec.verify(&attempt) {
            warn!(suspect, "repaired corrupted shard");
            *shards = attempt;
            return true;
        }
    }
    false
}
