//! Capacity and time bounded LRU cache.
//!
//! Entries expire `ttl` after insertion; reads bump recency but never extend
//! the lifetime. There is no sweeper: expired entries are dropped when they are
//! looked up or pushed out by capacity pressure, so [`TtlLruCache::size`] can
//! count entries that are already stale.
//!
//! The cache is not synchronized on its own. Owners put it behind whatever
//! lock already guards their state.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        Instant::now().saturating_duration_since(self.inserted_at) > ttl
    }
}

pub struct TtlLruCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V> TtlLruCache<K, V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// Insert or overwrite. A new key on a full cache evicts the least
    /// recently used entry first.
    pub fn set(&mut self, key: K, value: V) {
        self.entries.put(key, CacheEntry::new(value));
    }

    /// Returns the live value and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = self.entries.peek(key)?.is_expired(self.ttl);
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Like `get` without touching recency or removing stale entries.
    pub fn has(&self, key: &K) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(self.ttl))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
