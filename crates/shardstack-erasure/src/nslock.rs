//! Namespace lock table.
//!
//! A keyed readers–writer lock registry over `(volume, path)` pairs. Each
//! entry pairs a fair async `RwLock` with a pin count; the entry is removed
//! when the last interested task unpins it, so the table only ever holds
//! keys that are locked or being waited on.
//!
//! Acquisition is FIFO per key (tokio's `RwLock` is write-preferring and
//! fair), so writers do not starve under a stream of readers. Re-entrant
//! acquisition by the same task is not supported; callers must not lock the
//! same key twice.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type NsKey = (String, String);

#[derive(Debug)]
struct NsEntry {
    lock: Arc<RwLock<()>>,
    pins: usize,
}

/// Process-wide registry of per-object namespace locks.
///
/// Owned by the store instance; shared with in-flight readers and writers
/// through the guards it hands out.
#[derive(Debug, Default)]
pub struct NsLockMap {
    entries: Mutex<HashMap<NsKey, NsEntry>>,
}

impl NsLockMap {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of live entries; zero when nothing is locked or waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no entry is held or waited on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Acquire a shared lock on `(volume, path)`.
    pub async fn rlock(self: &Arc<Self>, volume: &str, path: &str) -> NsReadGuard {
        let key = (volume.to_owned(), path.to_owned());
        let lock = self.pin(&key);
        let guard = lock.read_owned().await;
        NsReadGuard {
            guard: Some(guard),
            map: Arc::clone(self),
            key,
        }
    }

    /// Acquire an exclusive lock on `(volume, path)`.
    pub async fn wlock(self: &Arc<Self>, volume: &str, path: &str) -> NsWriteGuard {
        let key = (volume.to_owned(), path.to_owned());
        let lock = self.pin(&key);
        let guard = lock.write_owned().await;
        NsWriteGuard {
            guard: Some(guard),
            map: Arc::clone(self),
            key,
        }
    }

    fn pin(&self, key: &NsKey) -> Arc<RwLock<()>> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| NsEntry {
            lock: Arc::new(RwLock::new(())),
            pins: 0,
        });
        entry.pins += 1;
        Arc::clone(&entry.lock)
    }

    fn unpin(&self, key: &NsKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.pins -= 1;
            if entry.pins == 0 {
                entries.remove(key);
            }
        }
    }
}

/// Shared-mode guard; unpins its entry on drop.
pub struct NsReadGuard {
    guard: Option<OwnedRwLockReadGuard<()>>,
    map: Arc<NsLockMap>,
    key: NsKey,
}

impl Drop for NsReadGuard {
    fn drop(&mut self) {
        // Release the lock before unpinning so the entry cannot be removed
        // while still held.
        self.guard.take();
        self.map.unpin(&self.key);
    }
}

/// Exclusive-mode guard; unpins its entry on drop.
pub struct NsWriteGuard {
    guard: Option<OwnedRwLockWriteGuard<()>>,
    map: Arc<NsLockMap>,
    key: NsKey,
}

impl Drop for NsWriteGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.map.unpin(&self.key);
    }
}
