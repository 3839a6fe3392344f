//! # Fallback cache with TTL and LRU bound.
//!
//! Values returned by a fallback operation are stored under
//! `"{operation}#{hash(args)}"`. Entries expire lazily: an expired entry is
//! removed when a lookup finds it, never by a background sweeper. When a
//! capacity is configured the least recently used entry makes room for a new one.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

/// One cached fallback value.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// Concurrent TTL + LRU map owned by a [`RecoveryOrchestrator`](crate::RecoveryOrchestrator).
pub struct FallbackCache<T> {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry<T>>>,
}

impl<T: Clone> FallbackCache<T> {
    /// Creates a cache; `capacity = None` keeps every entry until it expires.
    pub fn new(ttl: Duration, capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            ttl,
            entries: Mutex::new(entries),
        }
    }

    /// Cache key for `operation` called with `args`.
    pub fn key_for<A: Hash + ?Sized>(operation: &str, args: &A) -> String {
        let mut hasher = DefaultHasher::new();
        args.hash(&mut hasher);
        format!("{operation}#{:016x}", hasher.finish())
    }

    /// Returns a clone of a live entry; drops it if it has expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: String, value: T) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: Instant::now(),
            ttl: self.ttl,
        };
        self.entries.lock().put(key, entry);
    }

    /// Entries currently held, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_lazily() {
        let cache = FallbackCache::new(Duration::from_secs(300), None);
        let key = FallbackCache::<u32>::key_for("mirror", &("a", 1));
        cache.insert(key.clone(), 7u32);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key), Some(7));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = FallbackCache::new(Duration::from_secs(60), NonZeroUsize::new(2));
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".into(), 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn keys_differ_by_operation_and_args() {
        let a = FallbackCache::<()>::key_for("op", &1u8);
        let b = FallbackCache::<()>::key_for("op", &2u8);
        let c = FallbackCache::<()>::key_for("other", &1u8);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, FallbackCache::<()>::key_for("op", &1u8));
    }
}
