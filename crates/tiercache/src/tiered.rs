//! TieredCache: a memory tier in front of a disk tier

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tierstore::{CacheConfig, DiskCache, Result, SweepReport};
use tracing::{debug, warn};

use crate::cache::{Cache, CacheType};
use crate::memory::MemoryCache;

/// Memory + disk pair behaving as one cache
///
/// Reads try memory first and promote disk hits into memory. Writes go to
/// both tiers unless a specific tier is targeted.
pub struct TieredCache {
    memory: MemoryCache,
    disk: DiskCache,
}

impl TieredCache {
    /// Open a tiered cache whose disk tier lives at `root`
    pub fn open<P: AsRef<Path>>(root: P, config: CacheConfig) -> Result<Self> {
        let memory = MemoryCache::from_config(&config);
        let disk = DiskCache::open(root, config)?;
        Ok(Self::from_parts(memory, disk))
    }

    /// Combine existing tiers
    pub fn from_parts(memory: MemoryCache, disk: DiskCache) -> Self {
        Self { memory, disk }
    }

    /// Process-wide default instance under the system temp directory
    ///
    /// Initialised on first use. `None` if the directory could not be created.
    pub fn shared() -> Option<Arc<TieredCache>> {
        static SHARED: OnceLock<Option<Arc<TieredCache>>> = OnceLock::new();

        SHARED
            .get_or_init(|| {
                let root = std::env::temp_dir().join("tiercache").join("default");
                match TieredCache::open(&root, CacheConfig::default()) {
                    Ok(cache) => Some(Arc::new(cache)),
                    Err(e) => {
                        warn!(root = ?root, error = %e, "Failed to open shared cache");
                        None
                    }
                }
            })
            .clone()
    }

    /// Memory tier
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// Disk tier
    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// Look up `key` and report which tier answered
    pub fn query(&self, key: &str) -> Option<(Bytes, CacheType)> {
        if let Some(data) = self.memory.get(key) {
            return Some((data, CacheType::Memory));
        }

        let data = self.disk.get(key)?;
        if self.memory.set(key, data.clone()) {
            debug!(key, "Promoted disk hit into memory");
        }
        Some((data, CacheType::Disk))
    }

    /// Store into the tiers selected by `target`
    ///
    /// Returns `true` if at least one targeted tier accepted the payload.
    pub fn store_to(&self, key: &str, data: Bytes, target: CacheType) -> bool {
        let in_memory = target.includes_memory() && self.memory.set(key, data.clone());
        let on_disk = target.includes_disk() && self.disk.set(key, data);
        in_memory || on_disk
    }

    /// Remove from the tiers selected by `target`
    pub fn remove_from(&self, key: &str, target: CacheType) {
        if target.includes_memory() {
            self.memory.remove(key);
        }
        if target.includes_disk() {
            self.disk.remove(key);
        }
    }

    /// Which tier holds `key`, memory checked first
    pub fn contains_type(&self, key: &str) -> CacheType {
        if self.memory.contains(key) {
            CacheType::Memory
        } else if self.disk.contains(key) {
            CacheType::Disk
        } else {
            CacheType::None
        }
    }

    /// Clear the tiers selected by `target`
    pub fn clear(&self, target: CacheType) {
        if target.includes_memory() {
            self.memory.remove_all();
        }
        if target.includes_disk() {
            self.disk.remove_all();
        }
    }

    /// Forward an external memory pressure signal to the memory tier
    pub fn trim_to_memory_pressure(&self) {
        self.memory.trim_to_memory_pressure();
    }

    /// Run the disk sweep
    pub fn sweep(&self) -> SweepReport {
        self.disk.remove_expired_data()
    }

    /// Move the disk tier to `new_root`; see [`DiskCache::relocate`]
    pub fn relocate<P: AsRef<Path>>(&self, new_root: P) -> bool {
        self.disk.relocate(new_root)
    }
}

impl Cache for TieredCache {
    fn contains(&self, key: &str) -> bool {
        self.contains_type(key) != CacheType::None
    }

    fn data(&self, key: &str) -> Option<Bytes> {
        self.query(key).map(|(data, _)| data)
    }

    fn set_data(&self, key: &str, data: Bytes) -> bool {
        self.store_to(key, data, CacheType::All)
    }

    fn extended_data(&self, key: &str) -> Option<Bytes> {
        self.memory
            .get_extended(key)
            .or_else(|| self.disk.get_extended(key))
    }

    fn set_extended_data(&self, key: &str, data: Option<Bytes>) -> bool {
        let in_memory = self.memory.set_extended(key, data.clone());
        let on_disk = self.disk.set_extended(key, data);
        in_memory || on_disk
    }

    fn remove(&self, key: &str) {
        self.remove_from(key, CacheType::All);
    }

    fn remove_all(&self) {
        self.clear(CacheType::All);
    }

    fn remove_expired(&self) {
        self.sweep();
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        self.disk.path_for_key(key)
    }

    fn total_count(&self) -> u64 {
        self.disk.total_count()
    }

    fn total_size(&self) -> u64 {
        self.disk.total_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> TieredCache {
        TieredCache::open(dir.path().join("tiered"), CacheConfig::default()).unwrap()
    }

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_set_writes_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);

        assert!(cache.set_data("k", bytes("v")));
        assert!(cache.memory().contains("k"));
        assert!(cache.disk().contains("k"));
        assert_eq!(cache.query("k"), Some((bytes("v"), CacheType::Memory)));
    }

    #[test]
    fn test_disk_hit_is_promoted() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);

        cache.store_to("k", bytes("v"), CacheType::Disk);
        assert_eq!(cache.contains_type("k"), CacheType::Disk);

        assert_eq!(cache.query("k"), Some((bytes("v"), CacheType::Disk)));
        assert_eq!(cache.contains_type("k"), CacheType::Memory);
    }

    #[test]
    fn test_memory_pressure_keeps_disk() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);

        cache.set_data("k", bytes("v"));
        cache.trim_to_memory_pressure();

        assert!(cache.memory().is_empty());
        assert_eq!(cache.data("k"), Some(bytes("v")));
    }

    #[test]
    fn test_remove_from_single_tier() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);

        cache.set_data("k", bytes("v"));
        cache.remove_from("k", CacheType::Memory);
        assert_eq!(cache.contains_type("k"), CacheType::Disk);

        cache.remove("k");
        assert_eq!(cache.contains_type("k"), CacheType::None);
    }

    #[test]
    fn test_extended_data_follows_payload() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir);

        cache.set_data("k", bytes("v"));
        assert!(cache.set_extended_data("k", Some(bytes("meta"))));
        assert_eq!(cache.extended_data("k"), Some(bytes("meta")));
        assert_eq!(cache.data("k"), Some(bytes("v")));

        cache.remove("k");
        assert_eq!(cache.extended_data("k"), None);
    }

    #[test]
    fn test_memory_rejection_still_persists() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            memory_cost_limit: Some(2),
            ..CacheConfig::default()
        };
        let cache = TieredCache::open(dir.path(), config).unwrap();

        assert!(cache.set_data("k", bytes("too big for memory")));
        assert_eq!(cache.contains_type("k"), CacheType::Disk);
    }

    #[test]
    fn test_oversized_replacement_reads_new_payload() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            memory_cost_limit: Some(4),
            ..CacheConfig::default()
        };
        let cache = TieredCache::open(dir.path(), config).unwrap();

        assert!(cache.set_data("k", bytes("old")));
        assert!(cache.set_data("k", bytes("new-bigger-payload")));

        assert_eq!(cache.contains_type("k"), CacheType::Disk);
        assert_eq!(cache.data("k"), Some(bytes("new-bigger-payload")));
    }

    #[test]
    fn test_shared_is_single_instance() {
        let a = TieredCache::shared();
        let b = TieredCache::shared();

        if let (Some(a), Some(b)) = (a, b) {
            assert!(Arc::ptr_eq(&a, &b));
        }
    }
}
