//! Server configuration.
//!
//! [`ServerConfig`] carries everything the binary needs: listen addresses,
//! the disk set and erasure geometry, the free-space floor, optional TLS
//! material, and the access credentials taken from the `MINIO_ACCESS_KEY` /
//! `MINIO_SECRET_KEY` environment variables.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Minimum accepted access key length.
const MIN_ACCESS_KEY_LEN: usize = 5;

/// Minimum accepted secret key length.
const MIN_SECRET_KEY_LEN: usize = 8;

/// ShardStack server configuration.
///
/// # Examples
///
/// ```
/// use shardstack_s3::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.address, ":9000");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// S3 listen address.
    #[builder(default = String::from(":9000"))]
    pub address: String,

    /// Management service address. Recognized but the management service
    /// itself is not served by this binary.
    #[builder(default = String::from(":9001"))]
    pub address_mgmt: String,

    /// Storage RPC service address. Recognized but not served.
    #[builder(default = String::from(":9002"))]
    pub address_rpcserver: String,

    /// Disk roots. One entry runs a plain filesystem backend; several run
    /// the erasure store and must count `data_blocks + parity_blocks`.
    #[builder(default = vec![String::from("./data")])]
    pub disks: Vec<String>,

    /// Erasure data shards (multi-disk mode).
    #[builder(default = 4)]
    pub data_blocks: usize,

    /// Erasure parity shards (multi-disk mode).
    #[builder(default = 2)]
    pub parity_blocks: usize,

    /// Free-space floor: `"10%"`, an absolute byte count, or empty for
    /// no check.
    #[builder(default = String::new())]
    pub min_free_disk: String,

    /// TLS certificate file. Requires `key` as well.
    #[builder(default)]
    pub cert: Option<String>,

    /// TLS private key file. Requires `cert` as well.
    #[builder(default)]
    pub key: Option<String>,

    /// Access key; requests are unauthenticated when unset.
    #[builder(default)]
    pub access_key: Option<String>,

    /// Secret key; requests are unauthenticated when unset.
    #[builder(default)]
    pub secret_key: Option<String>,

    /// Log level filter string.
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from(":9000"),
            address_mgmt: String::from(":9001"),
            address_rpcserver: String::from(":9002"),
            disks: vec![String::from("./data")],
            data_blocks: 4,
            parity_blocks: 2,
            min_free_disk: String::new(),
            cert: None,
            key: None,
            access_key: None,
            secret_key: None,
            log_level: String::from("info"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SHARDSTACK_ADDRESS` | `:9000` |
    /// | `SHARDSTACK_ADDRESS_MGMT` | `:9001` |
    /// | `SHARDSTACK_ADDRESS_RPCSERVER` | `:9002` |
    /// | `SHARDSTACK_DISKS` | `./data` (comma-separated) |
    /// | `SHARDSTACK_DATA_BLOCKS` | `4` |
    /// | `SHARDSTACK_PARITY_BLOCKS` | `2` |
    /// | `SHARDSTACK_MIN_FREE_DISK` | *(unset)* |
    /// | `SHARDSTACK_CERT` / `SHARDSTACK_KEY` | *(unset)* |
    /// | `MINIO_ACCESS_KEY` / `MINIO_SECRET_KEY` | *(unset)* |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SHARDSTACK_ADDRESS") {
            config.address = v;
        }
        if let Ok(v) = std::env::var("SHARDSTACK_ADDRESS_MGMT") {
            config.address_mgmt = v;
        }
        if let Ok(v) = std::env::var("SHARDSTACK_ADDRESS_RPCSERVER") {
            config.address_rpcserver = v;
        }
        if let Ok(v) = std::env::var("SHARDSTACK_DISKS") {
            config.disks = v
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Ok(v) = std::env::var("SHARDSTACK_DATA_BLOCKS") {
            if let Ok(n) = v.parse() {
                config.data_blocks = n;
            }
        }
        if let Ok(v) = std::env::var("SHARDSTACK_PARITY_BLOCKS") {
            if let Ok(n) = v.parse() {
                config.parity_blocks = n;
            }
        }
        if let Ok(v) = std::env::var("SHARDSTACK_MIN_FREE_DISK") {
            config.min_free_disk = v;
        }
        if let Ok(v) = std::env::var("SHARDSTACK_CERT") {
            config.cert = Some(v);
        }
        if let Ok(v) = std::env::var("SHARDSTACK_KEY") {
            config.key = Some(v);
        }
        if let Ok(v) = std::env::var("MINIO_ACCESS_KEY") {
            config.access_key = Some(v);
        }
        if let Ok(v) = std::env::var("MINIO_SECRET_KEY") {
            config.secret_key = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first problem found:
    /// no disks, a disk count that does not match the erasure geometry,
    /// an unpaired cert/key, or credentials below the minimum lengths.
    pub fn validate(&self) -> Result<(), String> {
        if self.disks.is_empty() {
            return Err("at least one disk is required".to_owned());
        }
        if self.disks.len() > 1 && self.disks.len() != self.data_blocks + self.parity_blocks {
            return Err(format!(
                "{} disks do not match the {}+{} erasure geometry",
                self.disks.len(),
                self.data_blocks,
                self.parity_blocks
            ));
        }
        if self.cert.is_some() != self.key.is_some() {
            return Err("both certificate and key are required to enable https".to_owned());
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err("access key and secret key must be set together".to_owned());
        }
        if let Some(access) = &self.access_key {
            if access.len() < MIN_ACCESS_KEY_LEN {
                return Err(format!(
                    "access key must be at least {MIN_ACCESS_KEY_LEN} characters"
                ));
            }
        }
        if let Some(secret) = &self.secret_key {
            if secret.len() < MIN_SECRET_KEY_LEN {
                return Err(format!(
                    "secret key must be at least {MIN_SECRET_KEY_LEN} characters"
                ));
            }
        }
        Ok(())
    }
}
