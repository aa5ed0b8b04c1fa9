//! Typed array caches with last-update ordering
//!
//! Each named cache maps a typed key to an array of a declared element
//! type. Entries remember when they were last written so eviction can drop
//! the least-recently-updated ones; reads never change that order.

use super::EvictableCache;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// One cached array plus its write bookkeeping
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    items: Vec<T>,
    /// Monotonic write sequence used for LRU-by-update ordering
    updated_seq: u64,
    updated_at: DateTime<Utc>,
}

/// Named cache of `K -> Vec<T>`
///
/// Mutation is serialised per shard by the underlying map, so the monitor
/// and fetch completions can touch the same cache from different tasks.
pub struct TypedCache<K, T> {
    name: String,
    entries: DashMap<K, CacheEntry<T>>,
    sequence: AtomicU64,
    /// When false, `truncate` drops everything instead of trimming arrays
    partial_truncation: bool,
}

impl<K, T> TypedCache<K, T>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            sequence: AtomicU64::new(0),
            partial_truncation: true,
        }
    }

    /// Cache whose arrays cannot be meaningfully trimmed (e.g. encoded images)
    pub fn without_partial_truncation(mut self) -> Self {
        self.partial_truncation = false;
        self
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Replace the array held under `key`
    pub fn insert(&self, key: K, items: Vec<T>) {
        let entry = CacheEntry {
            items,
            updated_seq: self.next_seq(),
            updated_at: Utc::now(),
        };
        self.entries.insert(key, entry);
    }

    /// Append newly fetched items to the array under `key`
    pub fn append(&self, key: K, items: impl IntoIterator<Item = T>) {
        let seq = self.next_seq();
        let mut entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            items: Vec::new(),
            updated_seq: seq,
            updated_at: Utc::now(),
        });
        entry.items.extend(items);
        entry.updated_seq = seq;
        entry.updated_at = Utc::now();
    }

    /// Remove one entry, returning its array
    pub fn remove(&self, key: &K) -> Option<Vec<T>> {
        self.entries.remove(key).map(|(_, entry)| entry.items)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Length of the array under `key`
    pub fn array_len(&self, key: &K) -> Option<usize> {
        self.entries.get(key).map(|e| e.items.len())
    }

    /// Last write time of an entry
    pub fn updated_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.updated_at)
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, T> TypedCache<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Copy of the array under `key`
    pub fn get(&self, key: &K) -> Option<Vec<T>> {
        self.entries.get(key).map(|e| e.items.clone())
    }
}

impl<K, T> EvictableCache for TypedCache<K, T>
where
    K: Eq + Hash + Clone + Send + Sync,
    T: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn truncate(&self, max_length: usize) -> usize {
        if !self.partial_truncation {
            let oversized = self.entries.iter().any(|e| e.items.len() > max_length);
            return if oversized { self.clear_all() } else { 0 };
        }

        let mut removed = 0;
        for mut entry in self.entries.iter_mut() {
            let len = entry.items.len();
            if len > max_length {
                // Keep the most recently fetched slice
                entry.items.drain(0..len - max_length);
                removed += len - max_length;
            }
        }

        if removed > 0 {
            debug!(cache = %self.name, removed, max_length, "Truncated cached arrays");
        }
        removed
    }

    fn evict_lru(&self, max_entries: usize) -> usize {
        let len = self.entries.len();
        if len <= max_entries {
            return 0;
        }

        let mut by_update: Vec<(K, u64)> = self
            .entries
            .iter()
            .map(|r| (r.key().clone(), r.value().updated_seq))
            .collect();
        by_update.sort_by_key(|(_, seq)| *seq);

        let excess = by_update.len().saturating_sub(max_entries);
        let mut evicted = 0;
        for (key, seq) in by_update.into_iter().take(excess) {
            // Skip entries rewritten since the snapshot
            if self
                .entries
                .remove_if(&key, |_, e| e.updated_seq == seq)
                .is_some()
            {
                evicted += 1;
            }
        }

        debug!(cache = %self.name, evicted, max_entries, "Evicted least recently updated entries");
        evicted
    }

    fn clear_all(&self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn item_count(&self) -> usize {
        self.entries.iter().map(|e| e.items.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let cache: TypedCache<String, u32> = TypedCache::new("remote-data");
        cache.insert("a".to_string(), vec![1, 2, 3]);

        assert_eq!(cache.get(&"a".to_string()), Some(vec![1, 2, 3]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.item_count(), 3);

        assert_eq!(cache.remove(&"a".to_string()), Some(vec![1, 2, 3]));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_truncate_keeps_most_recent() {
        let cache: TypedCache<&'static str, usize> = TypedCache::new("remote-data");
        cache.append("history", 0..5000);
        cache.insert("short", vec![1, 2]);

        let removed = cache.truncate(800);

        assert_eq!(removed, 4200);
        let items = cache.get(&"history").unwrap();
        assert_eq!(items.len(), 800);
        assert_eq!(items[0], 4200);
        assert_eq!(items[799], 4999);
        assert_eq!(cache.array_len(&"short"), Some(2));
    }

    #[test]
    fn test_truncate_without_partial_support_clears() {
        let cache: TypedCache<&'static str, u8> =
            TypedCache::new("image-cache").without_partial_truncation();
        cache.insert("small", vec![0; 10]);
        assert_eq!(cache.truncate(100), 0);
        assert_eq!(cache.len(), 1);

        cache.insert("big", vec![0; 1000]);
        assert_eq!(cache.truncate(100), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_lru_by_last_update() {
        let cache: TypedCache<u32, u32> = TypedCache::new("derived-data");
        for key in 0..5 {
            cache.insert(key, vec![key]);
        }
        // Rewrite 0 so it becomes the most recently updated
        cache.append(0, [100]);
        // Reads do not refresh ordering
        let _ = cache.get(&1);

        let evicted = cache.evict_lru(3);

        assert_eq!(evicted, 2);
        assert!(cache.contains_key(&0));
        assert!(!cache.contains_key(&1));
        assert!(!cache.contains_key(&2));
        assert!(cache.contains_key(&3));
        assert!(cache.contains_key(&4));
    }

    #[test]
    fn test_evict_lru_under_limit_is_noop() {
        let cache: TypedCache<u32, u32> = TypedCache::new("derived-data");
        cache.insert(1, vec![]);
        assert_eq!(cache.evict_lru(10), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let cache: TypedCache<u32, u32> = TypedCache::new("derived-data");
        cache.insert(1, vec![1]);
        cache.insert(2, vec![2]);
        assert_eq!(cache.clear_all(), 2);
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.item_count(), 0);
    }
}
