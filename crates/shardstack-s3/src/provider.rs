//! S3 provider type.
//!
//! [`ShardStackS3`] owns the filesystem facade and the server
//! configuration; the `s3s::S3` trait methods live in the `ops` module.

use std::sync::Arc;

use shardstack_fs::Filesystem;

use crate::config::ServerConfig;

/// The S3 provider implementing the `s3s::S3` trait over the facade.
#[derive(Debug)]
pub struct ShardStackS3 {
    pub(crate) fs: Arc<Filesystem>,
    pub(crate) config: Arc<ServerConfig>,
}

impl ShardStackS3 {
    /// Create a provider over an existing facade.
    #[must_use]
    pub fn new(fs: Arc<Filesystem>, config: ServerConfig) -> Self {
        Self {
            fs,
            config: Arc::new(config),
        }
    }

    /// The underlying filesystem facade.
    #[must_use]
    pub fn fs(&self) -> &Filesystem {
        &self.fs
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
