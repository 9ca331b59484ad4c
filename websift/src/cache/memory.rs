//! In-process LRU tier.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry {
    value: serde_json::Value,
    /// `None` when the TTL overflows `Instant`; such entries never expire.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Bounded LRU cache with a fixed per-entry TTL.
///
/// `get` refreshes recency; `set` refreshes value, expiry and recency.
/// Inserting into a full cache evicts the least recently used entry.
pub struct MemoryTier {
    entries: Mutex<LruCache<String, Entry>>,
    capacity: NonZeroUsize,
    ttl: Duration,
}

impl std::fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTier")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryTier {
    /// Creates a tier holding at most `max_size` entries (at least one).
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl,
        }
    }

    /// Returns a live entry, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        entries.pop(key);
        None
    }

    /// Inserts or refreshes an entry.
    pub fn set(&self, key: &str, value: serde_json::Value) {
        let entry = Entry {
            value,
            expires_at: Instant::now().checked_add(self.ttl),
        };
        if let Some((evicted, _)) = self.entries.lock().push(key.to_string(), entry) {
            if evicted != key {
                tracing::trace!(key = %evicted, "Evicted least recently used entry");
            }
        }
    }

    /// Removes an entry.
    pub fn delete(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the tier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Entry time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `key` is present, without touching recency or expiry.
    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }
}
