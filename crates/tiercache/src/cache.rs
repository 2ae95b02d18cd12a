//! The capability set shared by every cache backend

use bytes::Bytes;
use std::path::PathBuf;
use tierstore::DiskCache;

/// Operations every cache backend supports
///
/// Empty keys are a guaranteed miss for lookups and a no-op for mutations.
/// Failures are never surfaced as errors; they read as a miss, `false`, or
/// nothing happening.
pub trait Cache: Send + Sync {
    /// Whether data is stored for `key`
    fn contains(&self, key: &str) -> bool;

    /// Payload stored for `key`
    fn data(&self, key: &str) -> Option<Bytes>;

    /// Store `data` for `key`; `false` if the backend refused or failed
    fn set_data(&self, key: &str, data: Bytes) -> bool;

    /// Extended metadata stored for `key`
    fn extended_data(&self, key: &str) -> Option<Bytes>;

    /// Attach metadata to an existing entry, or drop it with `None`
    fn set_extended_data(&self, key: &str, data: Option<Bytes>) -> bool;

    /// Remove the entry for `key`
    fn remove(&self, key: &str);

    /// Remove every entry
    fn remove_all(&self);

    /// Drop entries violating the configured age, count and size limits
    fn remove_expired(&self);

    /// Filesystem location of the entry for `key`, if the backend has one
    fn cache_path(&self, key: &str) -> Option<PathBuf>;

    /// Number of stored entries
    fn total_count(&self) -> u64;

    /// Total stored size (bytes on disk, cost in memory)
    fn total_size(&self) -> u64;
}

/// Where an entry lives, or which tier an operation should target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// Not cached / no tier
    None,
    /// Memory tier
    Memory,
    /// Disk tier
    Disk,
    /// Both tiers
    All,
}

impl CacheType {
    /// Whether this target includes the memory tier
    pub fn includes_memory(self) -> bool {
        matches!(self, CacheType::Memory | CacheType::All)
    }

    /// Whether this target includes the disk tier
    pub fn includes_disk(self) -> bool {
        matches!(self, CacheType::Disk | CacheType::All)
    }
}

impl Cache for DiskCache {
    fn contains(&self, key: &str) -> bool {
        DiskCache::contains(self, key)
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
        DiskCache::remove(self, key)
    }

    fn remove_all(&self) {
        DiskCache::remove_all(self)
    }

    fn remove_expired(&self) {
        self.remove_expired_data();
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        self.path_for_key(key)
    }

    fn total_count(&self) -> u64 {
        DiskCache::total_count(self)
    }

    fn total_size(&self) -> u64 {
        DiskCache::total_size(self)
    }
}
