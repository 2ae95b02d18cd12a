//! DiskCache: persistent blob cache on top of the I/O queue

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::migrate;
use crate::queue::IoQueue;
use crate::storage::{FileStore, RecordInfo, SweepReport};

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

/// Persistent file-per-key cache
///
/// Every method blocks the caller until the worker has finished the file
/// I/O. Failures are logged and reported as a miss (`None`/`false`); the
/// cache itself stays usable.
pub struct DiskCache {
    queue: IoQueue,
    config: CacheConfig,
}

impl DiskCache {
    /// Open or create a disk cache rooted at `root`
    ///
    /// # Arguments
    /// * `root` - Directory owned exclusively by this cache
    /// * `config` - Age, count and size limits applied by sweeps
    pub fn open<P: AsRef<Path>>(root: P, config: CacheConfig) -> Result<Self> {
        let store = FileStore::open(root.as_ref().to_path_buf(), config.clone())?;
        let name = format!("tierstore-io-{}", NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        let queue = IoQueue::spawn(name, store)?;

        debug!(root = ?root.as_ref(), "Disk cache opened");
        Ok(Self { queue, config })
    }

    /// Configuration this cache was opened with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Run a fallible job on the worker, logging and swallowing errors
    fn exec<R, F>(&self, op: &'static str, job: F) -> Option<R>
    where
        F: FnOnce(&mut FileStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match self.queue.run(job).and_then(|result| result) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(op, error = %e, "Disk cache operation failed");
                None
            }
        }
    }

    /// Currently active cache root
    pub fn root(&self) -> Option<PathBuf> {
        self.exec("root", |store| Ok(store.root().to_path_buf()))
    }

    /// Whether a record exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let key = key.to_string();
        self.exec("contains", move |store| Ok(store.contains(&key)))
            .unwrap_or(false)
    }

    /// Read the payload for `key`
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        let key = key.to_string();
        self.exec("get", move |store| store.read(&key))
            .flatten()
            .map(Bytes::from)
    }

    /// Write the payload for `key`, replacing any previous record
    ///
    /// Returns `false` if the write failed.
    pub fn set(&self, key: &str, data: Bytes) -> bool {
        if key.is_empty() {
            return false;
        }
        let key = key.to_string();
        self.exec("set", move |store| store.write(&key, &data))
            .is_some()
    }

    /// Read the extended metadata for `key`
    pub fn get_extended(&self, key: &str) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        let key = key.to_string();
        self.exec("get_extended", move |store| store.read_extended(&key))
            .flatten()
            .map(Bytes::from)
    }

    /// Attach metadata to an existing record, or drop it with `None`
    ///
    /// The payload file is never rewritten. Returns `false` when no record
    /// exists for `key` or the write failed.
    pub fn set_extended(&self, key: &str, data: Option<Bytes>) -> bool {
        if key.is_empty() {
            return false;
        }
        let key = key.to_string();
        self.exec("set_extended", move |store| {
            store.write_extended(&key, data.as_deref())
        })
        .unwrap_or(false)
    }

    /// Delete the record and metadata for `key`
    pub fn remove(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        let key = key.to_string();
        self.exec("remove", move |store| store.remove(&key));
    }

    /// Delete every record
    pub fn remove_all(&self) {
        self.exec("remove_all", |store| store.remove_all());
    }

    /// Path the record for `key` lives at, present or not
    pub fn path_for_key(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() {
            return None;
        }
        let key = key.to_string();
        self.exec("path_for_key", move |store| Ok(store.path_for_key(&key)))
    }

    /// Number of records (directory scan)
    pub fn total_count(&self) -> u64 {
        self.exec("total_count", |store| Ok(store.records()?.len() as u64))
            .unwrap_or(0)
    }

    /// Total payload bytes (directory scan)
    pub fn total_size(&self) -> u64 {
        self.exec("total_size", |store| {
            Ok(store.records()?.iter().map(|r| r.size).sum())
        })
        .unwrap_or(0)
    }

    /// List all records with their size and last access time
    pub fn records(&self) -> Vec<RecordInfo> {
        self.exec("records", |store| store.records())
            .unwrap_or_default()
    }

    /// Sweep stale records, then evict least recently accessed ones until the
    /// count and size limits hold
    pub fn remove_expired_data(&self) -> SweepReport {
        self.exec("remove_expired_data", |store| store.sweep(SystemTime::now()))
            .unwrap_or_default()
    }

    /// Move a cache directory, merging into an existing destination
    ///
    /// Runs on the I/O worker so it never overlaps this cache's own file
    /// access. Does not change the active root; see [`DiskCache::relocate`].
    pub fn move_cache_directory<P, Q>(&self, from: P, to: Q) -> bool
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let from = from.as_ref().to_path_buf();
        let to = to.as_ref().to_path_buf();
        self.exec("move_cache_directory", move |_| {
            migrate::move_cache_directory(&from, &to)
        })
        .is_some()
    }

    /// Make `new_root` the active root
    ///
    /// With `migrate_on_root_change` the current records are moved (merged)
    /// there first. The new root only becomes active once that has finished.
    pub fn relocate<P: AsRef<Path>>(&self, new_root: P) -> bool {
        let new_root = new_root.as_ref().to_path_buf();
        let target = new_root.clone();
        let moved = self
            .exec("relocate", move |store| store.relocate(target))
            .is_some();
        if moved {
            info!(root = ?new_root, "Disk cache relocated");
        }
        moved
    }
}
