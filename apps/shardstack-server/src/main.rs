//! ShardStack server - erasure-coded S3-compatible object storage.
//!
//! Wires the storage core to the wire: configuration from the environment,
//! a posix or erasure backend, the filesystem facade, the s3s protocol
//! layer, and a hyper accept loop with graceful shutdown.
//!
//! # Usage
//!
//! ```text
//! SHARDSTACK_DISKS=/d0,/d1,/d2,/d3,/d4,/d5 \
//! SHARDSTACK_DATA_BLOCKS=4 SHARDSTACK_PARITY_BLOCKS=2 \
//! MINIO_ACCESS_KEY=minioadmin MINIO_SECRET_KEY=minioadmin \
//! shardstack-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SHARDSTACK_ADDRESS` | `:9000` | S3 bind address |
//! | `SHARDSTACK_ADDRESS_MGMT` | `:9001` | Management address (reserved) |
//! | `SHARDSTACK_ADDRESS_RPCSERVER` | `:9002` | Storage RPC address (reserved) |
//! | `SHARDSTACK_DISKS` | `./data` | Comma-separated disk roots |
//! | `SHARDSTACK_DATA_BLOCKS` | `4` | Erasure data shards |
//! | `SHARDSTACK_PARITY_BLOCKS` | `2` | Erasure parity shards |
//! | `SHARDSTACK_MIN_FREE_DISK` | *(unset)* | Free-space floor (`10%` or bytes) |
//! | `MINIO_ACCESS_KEY` / `MINIO_SECRET_KEY` | *(unset)* | SigV4 credentials |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use s3s::service::S3ServiceBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shardstack_erasure::XlStore;
use shardstack_fs::Filesystem;
use shardstack_s3::{ServerConfig, ShardStackS3};
use shardstack_storage::{MinFreeDisk, PosixBackend, StorageBackend};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the storage backend the configuration describes: one disk runs a
/// plain posix backend, several run the erasure store.
async fn build_backend(config: &ServerConfig) -> Result<Arc<dyn StorageBackend>> {
    let min_free = MinFreeDisk::parse(&config.min_free_disk)
        .map_err(|e| anyhow::anyhow!("invalid min-free-disk setting: {e}"))?;

    if config.disks.len() == 1 {
        let backend = PosixBackend::with_min_free(config.disks[0].as_str(), min_free)
            .await
            .with_context(|| format!("cannot open disk {}", config.disks[0]))?;
        info!(disk = %config.disks[0], "running on a single posix backend");
        return Ok(Arc::new(backend));
    }

    let mut disks: Vec<Arc<dyn StorageBackend>> = Vec::with_capacity(config.disks.len());
    for root in &config.disks {
        let backend = PosixBackend::with_min_free(root.as_str(), min_free)
            .await
            .with_context(|| format!("cannot open disk {root}"))?;
        disks.push(Arc::new(backend));
    }
    let store = XlStore::new(disks, config.data_blocks, config.parity_blocks)
        .map_err(|e| anyhow::anyhow!("cannot build erasure store: {e}"))?;
    info!(
        disks = config.disks.len(),
        data_blocks = config.data_blocks,
        parity_blocks = config.parity_blocks,
        "running on an erasure pool"
    );
    Ok(Arc::new(store))
}

/// Build the shared s3s service over the facade.
fn build_s3_service(
    fs: Arc<Filesystem>,
    config: &ServerConfig,
) -> s3s::service::SharedS3Service {
    let provider = ShardStackS3::new(fs, config.clone());
    let mut builder = S3ServiceBuilder::new(provider);

    if let (Some(access), Some(secret)) = (&config.access_key, &config.secret_key) {
        builder.set_auth(s3s::auth::SimpleAuth::from_single(
            access.clone(),
            secret.clone(),
        ));
        info!("sigv4 authentication enabled");
    } else {
        warn!("no credentials configured; requests are unauthenticated");
    }

    builder.build().into_shared()
}

/// Normalize a `:port`-style address into something bindable.
fn normalize_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_owned()
    }
}

/// Run the accept loop, serving connections until a shutdown signal arrives.
async fn serve(listener: TcpListener, service: s3s::service::SharedS3Service) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env();

    init_tracing(&config.log_level)?;

    config
        .validate()
        .map_err(|reason| anyhow::anyhow!("invalid configuration: {reason}"))?;

    if config.cert.is_some() {
        // TLS material is validated above but termination is delegated to a
        // fronting proxy.
        warn!("cert/key configured; terminate TLS in front of this server");
    }

    info!(
        address = %config.address,
        address_mgmt = %config.address_mgmt,
        address_rpcserver = %config.address_rpcserver,
        version = VERSION,
        "starting ShardStack",
    );

    let backend = build_backend(&config).await?;
    let fs = Arc::new(Filesystem::new(backend));
    let service = build_s3_service(fs, &config);

    let addr: SocketAddr = normalize_address(&config.address)
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.address))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}
