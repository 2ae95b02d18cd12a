//! MemoryCache: thread-safe, cost-weighted LRU tier

use bytes::Bytes;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tierstore::CacheConfig;
use tracing::debug;

use crate::cache::Cache;
use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Estimates the eviction cost of a payload
pub type CostFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

#[derive(Clone)]
struct Entry {
    payload: Bytes,
    extended: Option<Bytes>,
}

/// In-process LRU cache keyed by string
///
/// All calls go through one mutex and never do I/O.
pub struct MemoryCache {
    lru: Mutex<LruCache<String, Entry>>,
    stats: CacheStats,
    cost_fn: CostFn,
}

impl MemoryCache {
    /// Create a memory cache; `None` limits are unlimited
    pub fn new(count_limit: Option<usize>, cost_limit: Option<u64>) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(count_limit, cost_limit)),
            stats: CacheStats::new(),
            cost_fn: Arc::new(|payload: &[u8]| payload.len() as u64),
        }
    }

    /// Create a memory cache from the memory limits of `config`
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.memory_count_limit, config.memory_cost_limit)
    }

    /// Replace the default byte-length cost estimate
    pub fn with_cost_fn<F>(mut self, cost_fn: F) -> Self
    where
        F: Fn(&[u8]) -> u64 + Send + Sync + 'static,
    {
        self.cost_fn = Arc::new(cost_fn);
        self
    }

    /// Get a payload and mark it most recently used
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }

        let payload = self.lru.lock().get(key).map(|entry| entry.payload.clone());
        match payload {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        payload
    }

    /// Store a payload with its estimated cost
    pub fn set(&self, key: &str, payload: Bytes) -> bool {
        let cost = (self.cost_fn)(&payload);
        self.set_with_cost(key, payload, cost)
    }

    /// Store a payload with an explicit cost
    ///
    /// Returns `false` if the payload alone exceeds a limit; any previous
    /// entry for `key` is dropped in that case.
    pub fn set_with_cost(&self, key: &str, payload: Bytes, cost: u64) -> bool {
        if key.is_empty() {
            return false;
        }

        let entry = Entry {
            payload,
            extended: None,
        };
        let outcome = self.lru.lock().put(key.to_string(), entry, cost);

        match outcome {
            Some(evicted) => {
                self.stats.record_insert();
                if evicted > 0 {
                    self.stats.record_evictions(evicted as u64);
                    debug!(key, evicted, "Memory cache evicted entries");
                }
                true
            }
            None => {
                self.stats.record_rejection();
                debug!(key, cost, "Memory cache rejected oversized entry");
                false
            }
        }
    }

    /// Check for a key without promoting it
    pub fn contains(&self, key: &str) -> bool {
        !key.is_empty() && self.lru.lock().contains(key)
    }

    /// Extended metadata held next to the entry
    pub fn get_extended(&self, key: &str) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        self.lru
            .lock()
            .peek_mut(key)
            .and_then(|entry| entry.extended.clone())
    }

    /// Attach metadata to an existing entry, or drop it with `None`
    pub fn set_extended(&self, key: &str, data: Option<Bytes>) -> bool {
        if key.is_empty() {
            return false;
        }
        match self.lru.lock().peek_mut(key) {
            Some(entry) => {
                entry.extended = data;
                true
            }
            None => false,
        }
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.lru.lock().remove(key);
    }

    /// Remove every entry
    pub fn remove_all(&self) {
        self.lru.lock().clear();
    }

    /// Drop everything in response to an external memory pressure signal
    pub fn trim_to_memory_pressure(&self) {
        let mut lru = self.lru.lock();
        let dropped = lru.len();
        lru.clear();
        drop(lru);

        self.stats.record_evictions(dropped as u64);
        debug!(dropped, "Memory cache trimmed for memory pressure");
    }

    /// Change the limits, evicting least recently used entries as needed
    pub fn set_limits(&self, count_limit: Option<usize>, cost_limit: Option<u64>) {
        let evicted = self.lru.lock().set_limits(count_limit, cost_limit);
        self.stats.record_evictions(evicted as u64);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Sum of entry costs
    pub fn total_cost(&self) -> u64 {
        self.lru.lock().total_cost()
    }

    /// Count limit, if any
    pub fn count_limit(&self) -> Option<usize> {
        self.lru.lock().count_limit()
    }

    /// Cost limit, if any
    pub fn cost_limit(&self) -> Option<u64> {
        self.lru.lock().cost_limit()
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        self.lru.lock().keys().into_iter().cloned().collect()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Cache for MemoryCache {
    fn contains(&self, key: &str) -> bool {
        MemoryCache::contains(self, key)
    }

    fn data(&self, key: &str) -> Option<Bytes> {
        self.get(key)
    }

    fn set_data(&self, key: &str, data: Bytes) -> bool {
        self.set(key, data)
    }

    fn extended_data(&self, key: &str) -> Option<Bytes> {
        self.get_extended(key)
    }

    fn set_extended_data(&self, key: &str, data: Option<Bytes>) -> bool {
        self.set_extended(key, data)
    }

    fn remove(&self, key: &str) {
        MemoryCache::remove(self, key)
    }

    fn remove_all(&self) {
        MemoryCache::remove_all(self)
    }

    fn remove_expired(&self) {}

    fn cache_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }

    fn total_count(&self) -> u64 {
        self.len() as u64
    }

    fn total_size(&self) -> u64 {
        self.total_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::default();

        assert!(cache.set("k", bytes("value")));
        assert_eq!(cache.get("k"), Some(bytes("value")));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_empty_key() {
        let cache = MemoryCache::default();

        assert!(!cache.set("", bytes("value")));
        assert_eq!(cache.get(""), None);
        assert!(!cache.contains(""));
        cache.remove("");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_default_cost_is_byte_length() {
        let cache = MemoryCache::default();

        cache.set("a", bytes("12345"));
        cache.set("b", bytes("123"));
        assert_eq!(cache.total_cost(), 8);
    }

    #[test]
    fn test_custom_cost_fn() {
        let cache = MemoryCache::new(None, Some(3)).with_cost_fn(|_| 1);

        cache.set("a", bytes("large payload"));
        cache.set("b", bytes("large payload"));
        cache.set("c", bytes("large payload"));
        cache.set("d", bytes("large payload"));

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_lru_eviction_by_count() {
        let cache = MemoryCache::new(Some(2), None);

        cache.set("a", bytes("1"));
        cache.set("b", bytes("2"));
        cache.get("a");
        cache.set("c", bytes("3"));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[test]
    fn test_oversized_rejected() {
        let cache = MemoryCache::new(None, Some(4));

        assert!(cache.set("small", bytes("abc")));
        assert!(!cache.set("big", bytes("abcdef")));

        assert!(cache.contains("small"));
        assert!(!cache.contains("big"));
        assert_eq!(cache.stats().rejections(), 1);
    }

    #[test]
    fn test_oversized_replacement_drops_old_entry() {
        let cache = MemoryCache::new(None, Some(4));

        assert!(cache.set("k", bytes("old")));
        assert!(!cache.set("k", bytes("too large")));

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_zero_cost_entries() {
        let cache = MemoryCache::new(None, Some(1));

        for key in ["a", "b", "c"] {
            assert!(cache.set_with_cost(key, bytes("payload"), 0));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_extended_data() {
        let cache = MemoryCache::default();

        assert!(!cache.set_extended("k", Some(bytes("meta"))));

        cache.set("k", bytes("v"));
        assert!(cache.set_extended("k", Some(bytes("meta"))));
        assert_eq!(cache.get_extended("k"), Some(bytes("meta")));
        assert_eq!(cache.get("k"), Some(bytes("v")));

        // A new payload starts without metadata
        cache.set("k", bytes("v2"));
        assert_eq!(cache.get_extended("k"), None);
    }

    #[test]
    fn test_trim_to_memory_pressure() {
        let cache = MemoryCache::default();

        cache.set("a", bytes("1"));
        cache.set("b", bytes("2"));
        cache.trim_to_memory_pressure();

        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
        assert!(cache.set("c", bytes("3")));
    }

    #[test]
    fn test_set_limits() {
        let cache = MemoryCache::default();

        for key in ["a", "b", "c", "d"] {
            cache.set(key, bytes("x"));
        }
        cache.set_limits(Some(2), None);

        assert_eq!(cache.keys(), vec!["d".to_string(), "c".to_string()]);
        assert_eq!(cache.count_limit(), Some(2));
    }

    #[test]
    fn test_remove_idempotent() {
        let cache = MemoryCache::default();

        cache.set("k", bytes("v"));
        cache.remove("k");
        cache.remove("k");
        cache.remove_all();
        cache.remove_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(MemoryCache::new(Some(64), None));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("{}-{}", t, i % 32);
                        cache.set(&key, Bytes::from(key.clone().into_bytes()));
                        if let Some(value) = cache.get(&key) {
                            assert_eq!(value, key.as_bytes());
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 64);
    }
}
