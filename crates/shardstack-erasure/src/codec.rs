//! Reed–Solomon codec glue.
//!
//! Wraps [`reed_solomon_erasure`] behind the four operations the object
//! store needs: split a block into shards, verify parity, reconstruct
//! missing shards, and join shards back into the original bytes. A missing
//! shard is a `None` in the shard array; the decoder only cares that at
//! least `data_shards` entries are present, never which ones.

use bytes::{Bytes, BytesMut};
use reed_solomon_erasure::galois_8::ReedSolomon;
use reed_solomon_erasure::Error as RsError;
use shardstack_storage::{StorageError, StorageResult};

/// Erasure encoder/decoder for a fixed `(data, parity)` geometry.
///
/// `parity == 0` is a degenerate passthrough configuration: verification
/// always holds and reconstruction can only succeed when nothing is missing.
pub struct ErasureCodec {
    data_shards: usize,
    parity_shards: usize,
    /// None in the parity-less passthrough configuration.
    rs: Option<ReedSolomon>,
}

impl std::fmt::Debug for ErasureCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasureCodec")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .finish()
    }
}

impl ErasureCodec {
    /// Create a codec for `data_shards` + `parity_shards` total shards.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] when `data_shards` is zero
    /// or the geometry is rejected by the underlying library.
    pub fn new(data_shards: usize, parity_shards: usize) -> StorageResult<Self> {
        if data_shards == 0 {
            return Err(StorageError::InvalidArgument {
                message: "erasure geometry needs at least one data shard".to_owned(),
            });
        }
        let rs = if parity_shards == 0 {
            None
        } else {
            Some(
                ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
                    StorageError::InvalidArgument {
                        message: format!(
                            "invalid erasure geometry {data_shards}+{parity_shards}: {e}"
                        ),
                    }
                })?,
            )
        };
        Ok(Self {
            data_shards,
            parity_shards,
            rs,
        })
    }

    /// Number of data shards.
    #[must_use]
    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    /// Number of parity shards.
    #[must_use]
    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    /// Total shard count.
    #[must_use]
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Per-shard length for a block of `block_len` bytes.
    #[must_use]
    pub fn shard_len(&self, block_len: usize) -> usize {
        block_len.div_ceil(self.data_shards)
    }

    /// Split a block into `total_shards` equal-length shards and fill in the
    /// parity shards. The last data shard is zero-padded.
    ///
    /// # Errors
    ///
    /// Returns an error when the block is empty or encoding fails.
    pub fn encode(&self, block: &[u8]) -> Result<Vec<Vec<u8>>, RsError> {
        if block.is_empty() {
            return Err(RsError::EmptyShard);
        }
        let shard_len = self.shard_len(block.len());
        let mut shards: Vec<Vec<u8>> = Vec::with_capacity(self.total_shards());
        for chunk in block.chunks(shard_len) {
            let mut shard = chunk.to_vec();
            shard.resize(shard_len, 0);
            shards.push(shard);
        }
        // A very short block can produce fewer than data_shards chunks.
        while shards.len() < self.data_shards {
            shards.push(vec![0u8; shard_len]);
        }
        for _ in 0..self.parity_shards {
            shards.push(vec![0u8; shard_len]);
        }
        if let Some(rs) = &self.rs {
            rs.encode(&mut shards)?;
        }
        Ok(shards)
    }

    /// Check whether the parity relations hold.
    ///
    /// Missing shards, length mismatches, and library-level failures all
    /// report `false`; the caller's next step is reconstruction either way.
    #[must_use]
    pub fn verify(&self, shards: &[Option<Vec<u8>>]) -> bool {
        let present: Vec<&[u8]> = shards
            .iter()
            .filter_map(|s| s.as_deref())
            .collect();
        if present.len() != self.total_shards() {
            return false;
        }
        match &self.rs {
            Some(rs) => rs.verify(&present).unwrap_or(false),
            None => true,
        }
    }

    /// Reconstruct every missing shard in place.
    ///
    /// # Errors
    ///
    /// Fails when fewer than `data_shards` shards are present or their
    /// lengths disagree.
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<(), RsError> {
        match &self.rs {
            Some(rs) => rs.reconstruct(shards),
            None => {
                if shards.iter().all(Option::is_some) {
                    Ok(())
                } else {
                    Err(RsError::TooFewShardsPresent)
                }
            }
        }
    }

    /// Concatenate the data shards, truncated to the original `data_len`.
    ///
    /// # Errors
    ///
    /// Fails when any of the first `data_shards` entries is missing.
    pub fn join(&self, shards: &[Option<Vec<u8>>], data_len: usize) -> Result<Bytes, RsError> {
        let mut out = BytesMut::with_capacity(data_len);
        for shard in shards.iter().take(self.data_shards) {
            let shard = shard.as_deref().ok_or(RsError::TooFewDataShards)?;
            let remaining = data_len - out.len();
            out.extend_from_slice(&shard[..shard.len().min(remaining)]);
        }
        if out.len() != data_len {
            return Err(RsError::TooFewDataShards);
        }
        Ok(out.freeze())
    }
}
