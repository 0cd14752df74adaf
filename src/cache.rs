//! Bounded memoization cache.
//!
//! Entries live in a ring buffer of fixed capacity with a hash index for
//! lookup. When the buffer is full the oldest insertion is evicted, so memory
//! use never grows past `capacity` entries. Instances are created by the
//! owning service and injected, never shared through a global.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// FIFO-evicting cache backed by a ring buffer
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    /// Insertion order, oldest at the front
    ring: VecDeque<K>,
    /// Lookup index
    index: HashMap<K, V>,
    /// Maximum number of entries
    capacity: usize,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters for a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero disables caching: every insert is dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a value, recording a hit or miss
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.index.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a value, evicting the oldest entry when full
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        if self.index.contains_key(&key) {
            self.index.insert(key, value);
            return;
        }

        while self.ring.len() >= self.capacity {
            if let Some(oldest) = self.ring.pop_front() {
                self.index.remove(&oldest);
            }
        }

        self.ring.push_back(key.clone());
        self.index.insert(key, value);
    }

    /// Return the cached value or compute, store and return it
    pub fn get_or_insert_with<F, E>(&mut self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop every entry, keeping the counters
    pub fn clear(&mut self) {
        self.ring.clear();
        self.index.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.index.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert!(!cache.contains(&"a"));
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let mut cache = BoundedCache::new(0);
        cache.insert("a", 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_or_insert_with_counts_hits() {
        let mut cache: BoundedCache<&str, u32> = BoundedCache::new(4);
        let mut computed = 0;

        for _ in 0..3 {
            let value: Result<u32, ()> = cache.get_or_insert_with("k", || {
                computed += 1;
                Ok(7)
            });
            assert_eq!(value, Ok(7));
        }

        assert_eq!(computed, 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let mut cache: BoundedCache<&str, u32> = BoundedCache::new(4);
        let result: Result<u32, &str> = cache.get_or_insert_with("k", || Err("boom"));
        assert!(result.is_err());
        assert!(!cache.contains(&"k"));
    }
}
