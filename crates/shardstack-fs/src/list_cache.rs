//! Listing continuation cache.
//!
//! Bounded cache from listing parameters to a parked [`Walker`], so a
//! paginated listing resumes its directory walk instead of restarting it.
//! Entries are keyed by the marker the *next* call will present. Capacity
//! eviction, TTL expiry, and replacement all drop the parked walker, which
//! terminates its producer task.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::walker::Walker;

/// Default number of parked walkers.
const DEFAULT_CAPACITY: usize = 1024;

/// Default time a parked walker survives without being claimed.
const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Key identifying one listing continuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListParams {
    /// Bucket being listed.
    pub bucket: String,
    /// `""` or `"/"`.
    pub delimiter: String,
    /// Marker the continuation resumes after.
    pub marker: String,
    /// Name prefix filter.
    pub prefix: String,
}

struct Parked {
    walker: Walker,
    parked_at: Instant,
}

/// Bounded TTL cache of parked walkers.
pub struct ListCache {
    entries: Mutex<HashMap<ListParams, Parked>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ListCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ListCache {
    /// Cache with the default capacity (1024) and TTL (15 s).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Cache with explicit capacity and TTL.
    #[must_use]
    pub fn with_config(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Remove and return the walker parked under `params`, if any.
    pub fn pop(&self, params: &ListParams) -> Option<Walker> {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, self.ttl);
        entries.remove(params).map(|parked| parked.walker)
    }

    /// Park `walker` under `params`, replacing any prior entry and evicting
    /// the oldest entry when full.
    pub fn push(&self, params: ListParams, walker: Walker) {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, self.ttl);
        if entries.len() >= self.capacity && !entries.contains_key(&params) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, parked)| parked.parked_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                trace!(?key, "evicting oldest parked walker");
                entries.remove(&key);
            }
        }
        entries.insert(
            params,
            Parked {
                walker,
                parked_at: Instant::now(),
            },
        );
    }

    /// Number of currently parked walkers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn sweep(entries: &mut HashMap<ListParams, Parked>, ttl: Duration) {
        // Dropping the parked walker terminates its task.
        entries.retain(|_, parked| parked.parked_at.elapsed() < ttl);
    }
}
