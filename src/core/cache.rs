use std::time::{Duration, SystemTime};

use ahash::AHashMap as HashMap;

const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CAPACITY: usize = 1000;

struct CacheEntry<V> {
    value: V,
    expires_at: SystemTime,
}

/// Response cache with absolute expiry.
///
/// Entries are evicted lazily: a read past `expires_at` removes the entry
/// and reports it absent, so no background sweep is needed. An entry that
/// is never re-read lingers until overwritten or invalidated, an accepted
/// trade-off given the bounded key space of normalized request paths.
///
/// `get` hands out clones of the stored value, never references into the
/// store.
pub struct ResponseCache<V> {
    data: HashMap<String, CacheEntry<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ResponseCache {
            data: HashMap::with_capacity((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize),
        }
    }

    /// Look up a key, evicting it first if it has expired.
    pub fn get(&mut self, key: &str, now: SystemTime) -> Option<V> {
        let live = match self.data.get(key) {
            Some(entry) => entry.expires_at > now,
            None => return None,
        };
        if live {
            self.data.get(key).map(|entry| entry.value.clone())
        } else {
            self.data.remove(key);
            None
        }
    }

    /// Store a value until `now + ttl`. Overwrites unconditionally;
    /// last writer wins.
    pub fn set(&mut self, key: String, value: V, ttl: Duration, now: SystemTime) {
        self.data.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove a single key. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Remove every entry whose key contains `pattern`, returning the number
    /// removed. Used to cascade-invalidate all cached views of an entity
    /// family after a mutation.
    pub fn invalidate_matching(&mut self, pattern: &str) -> usize {
        let before = self.data.len();
        self.data.retain(|key, _| !key.contains(pattern));
        before - self.data.len()
    }

    /// Number of entries currently stored, expired-but-unread ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
