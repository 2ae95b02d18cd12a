//! Cache configuration
//!
//! Every limit is an advisory ceiling enforced by eviction. `None` means the
//! cache never evicts for that reason.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default disk age limit: one week
pub const DEFAULT_DISK_AGE_LIMIT_SECS: u64 = 60 * 60 * 24 * 7;

/// Which file timestamp counts as a disk record's last access time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireType {
    /// File access time, stamped explicitly on every read
    #[default]
    AccessDate,
    /// File modification time, only moved by writes
    ModificationDate,
}

/// Limits shared by the memory and disk tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory
    pub memory_count_limit: Option<usize>,
    /// Maximum total cost held in memory
    pub memory_cost_limit: Option<u64>,
    /// Records not accessed for this many seconds are swept
    pub disk_age_limit_secs: Option<u64>,
    /// Maximum number of records on disk after a sweep
    pub disk_count_limit: Option<u64>,
    /// Maximum total payload bytes on disk after a sweep
    pub disk_size_limit: Option<u64>,
    /// Move existing records when the cache root changes
    pub migrate_on_root_change: bool,
    /// Timestamp used for age and quota ordering
    pub expire_type: ExpireType,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_count_limit: None,
            memory_cost_limit: None,
            disk_age_limit_secs: Some(DEFAULT_DISK_AGE_LIMIT_SECS),
            disk_count_limit: None,
            disk_size_limit: None,
            migrate_on_root_change: true,
            expire_type: ExpireType::AccessDate,
        }
    }
}

impl CacheConfig {
    /// Disk age limit as a duration
    pub fn disk_age_limit(&self) -> Option<Duration> {
        self.disk_age_limit_secs.map(Duration::from_secs)
    }

    /// Whether a sweep could delete anything beyond stale records
    pub fn has_disk_quota(&self) -> bool {
        self.disk_count_limit.is_some() || self.disk_size_limit.is_some()
    }
}
