//! # tiercache
//!
//! Multi-tier blob cache built on [`tierstore`].
//!
//! ## Architecture
//! - **MemoryCache**: cost-weighted LRU, AHash index, one mutex per instance
//! - **TieredCache**: memory tier in front of a [`DiskCache`]
//! - **CachesManager**: ordered backend list driven by per-operation
//!   policies (serial, concurrent fan-out, highest-only, lowest-only)
//! - **Cache**: the capability set every backend implements

#![warn(missing_docs)]

mod barrier;
mod cache;
mod lru;
mod manager;
mod memory;
mod operations;
mod stats;
mod tiered;

pub use barrier::CompletionBarrier;
pub use cache::{Cache, CacheType};
pub use manager::{CachesManager, OperationKind, OperationPolicies, OperationPolicy};
pub use memory::{CostFn, MemoryCache};
pub use stats::CacheStats;
pub use tiered::TieredCache;

pub use bytes::Bytes;
pub use tierstore::{
    move_cache_directory, CacheConfig, DiskCache, ExpireType, RecordInfo, SweepReport,
    DEFAULT_DISK_AGE_LIMIT_SECS,
};
