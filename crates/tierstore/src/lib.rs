//! # tierstore
//!
//! Persistent tier of the TierCache blob cache.
//!
//! ## Architecture
//! - **File per key**: SHA-256 of the key names the payload file
//! - **Sidecar metadata**: extended data lives next to the payload and is
//!   updated without touching it
//! - **I/O queue**: one worker thread per cache serializes all file access
//! - **Sweep**: age cutoff first, then least-recently-accessed eviction down
//!   to the count and size quota

#![warn(missing_docs)]

mod config;
mod disk;
mod error;
mod migrate;
mod parser;
mod queue;
mod storage;

pub use config::{CacheConfig, ExpireType, DEFAULT_DISK_AGE_LIMIT_SECS};
pub use disk::DiskCache;
pub use error::{Error, Result};
pub use migrate::move_cache_directory;
pub use storage::{file_name_for_key, RecordInfo, SweepReport};
