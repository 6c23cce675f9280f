//! Bounded LRU map.
//!
//! Entries are kept in an `IndexMap` in recency order: the front is the
//! least recently used entry and is the first to go when the map is full.

use std::hash::Hash;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted: Instant,
    ttl: Option<Duration>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(self.inserted) >= ttl,
            None => false,
        }
    }
}

/// A least-recently-used map with a maximum length and optional TTL.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    entries: IndexMap<K, Entry<V>>,
    max_len: usize,
    default_ttl: Option<Duration>,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Create a cache holding at most `max_len` entries.
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(max_len),
            max_len,
            default_ttl: None,
        }
    }

    /// Expire entries `ttl` after insertion unless told otherwise.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Maximum number of entries.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Get a live entry and mark it most recently used.
    ///
    /// Expired entries are evicted and reported as absent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let index = self.entries.get_index_of(key)?;
        let expired = self
            .entries
            .get_index(index)
            .is_some_and(|(_, entry)| entry.is_expired(Instant::now()));
        if expired {
            self.entries.shift_remove_index(index);
            return None;
        }

        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, entry)| &entry.value)
    }

    /// Insert with the default TTL, evicting the least recently used entry
    /// if the cache is full.
    pub fn insert(&mut self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL.
    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Option<Duration>) {
        self.entries.shift_remove(&key);
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                ttl,
            },
        );
        while self.entries.len() > self.max_len {
            self.entries.shift_remove_index(0);
        }
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key).map(|entry| entry.value)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
