//! The listing walker.
//!
//! A walker is a lazy, single-consumer producer of listing entries: a
//! spawned task pages through [`StorageBackend::list_files`] and feeds a
//! bounded channel in lexicographic order. Consumers pull entries one at a
//! time; dropping the walker aborts the task, which is the explicit-close
//! signal the continuation cache relies on.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use shardstack_storage::{FileEntry, StorageBackend, StorageResult};

/// Entries buffered between the walk task and its consumer.
const WALK_CHANNEL_DEPTH: usize = 1000;

/// Page size per `list_files` call inside the walk task.
const WALK_PAGE: usize = 1000;

/// Single-consumer lazy stream of listing entries.
pub struct Walker {
    rx: mpsc::Receiver<StorageResult<FileEntry>>,
    task: JoinHandle<()>,
}

impl Walker {
    /// Start a walk over `bucket` for names starting with `prefix`,
    /// strictly after `marker`. Recursive walks yield files depth-first;
    /// non-recursive walks stay one level deep and yield directories too.
    #[must_use]
    pub fn spawn(
        backend: Arc<dyn StorageBackend>,
        bucket: String,
        prefix: String,
        marker: String,
        recursive: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(WALK_CHANNEL_DEPTH);
        let task = tokio::spawn(async move {
            let mut marker = marker;
            loop {
                let page = match backend
                    .list_files(&bucket, &prefix, &marker, recursive, WALK_PAGE)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        // Surface the failure as the final entry.
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                for entry in page.entries {
                    marker.clone_from(&entry.name);
                    if tx.send(Ok(entry)).await.is_err() {
                        trace!(bucket = %bucket, "walker consumer gone");
                        return;
                    }
                }
                if page.eof {
                    return;
                }
            }
        });
        Self { rx, task }
    }

    /// Pull the next entry; `None` when the walk is exhausted.
    pub async fn next(&mut self) -> Option<StorageResult<FileEntry>> {
        self.rx.recv().await
    }
}

impl Drop for Walker {
    fn drop(&mut self) {
        // A parked walker may be blocked on a full channel or on backend
        // IO; terminate it explicitly.
        self.task.abort();
    }
}
