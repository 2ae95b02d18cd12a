//! File-per-key storage
//!
//! Directory layout:
//! - `<sha256(key) hex>`: payload file
//! - `<sha256(key) hex>.ext`: extended metadata sidecar (see [`crate::parser`])
//! - `<name>.tmp`: in-flight write, renamed into place once complete
//!
//! Only dot-free file names count as records. All methods run on the
//! [`crate::queue::IoQueue`] worker, so no two of them race on a file.

use sha2::{Digest, Sha256};
use std::fs::{self, FileTimes, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config::{CacheConfig, ExpireType};
use crate::error::Result;
use crate::migrate::move_cache_directory;
use crate::parser::{create_sidecar, parse_sidecar};

const SIDECAR_SUFFIX: &str = "ext";
const TEMP_SUFFIX: &str = "tmp";

/// One persisted record as seen by a directory scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    /// File name inside the cache root
    pub name: String,
    /// Payload size in bytes
    pub size: u64,
    /// Timestamp used for expiration, per [`ExpireType`]
    pub last_access: SystemTime,
}

/// Outcome of an expiration sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records deleted for exceeding the age limit
    pub expired: u64,
    /// Records deleted to get back under the count/size quota
    pub evicted: u64,
    /// Records left after the sweep
    pub remaining_count: u64,
    /// Payload bytes left after the sweep
    pub remaining_size: u64,
}

impl SweepReport {
    /// Total records deleted
    pub fn removed(&self) -> u64 {
        self.expired + self.evicted
    }
}

/// Deterministic file name for a key
pub fn file_name_for_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = with_suffix(path, TEMP_SUFFIX);
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn stamp_access(path: &Path, at: SystemTime) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_times(FileTimes::new().set_accessed(at))
}

/// Filesystem state owned by the I/O worker
pub(crate) struct FileStore {
    root: PathBuf,
    config: CacheConfig,
}

impl FileStore {
    /// Open or create a store rooted at `root`
    pub fn open(root: PathBuf, config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.root.join(file_name_for_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for_key(key).is_file()
    }

    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for_key(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.config.expire_type == ExpireType::AccessDate {
            if let Err(e) = stamp_access(&path, SystemTime::now()) {
                debug!(path = ?path, error = %e, "Failed to stamp access time");
            }
        }

        Ok(Some(data))
    }

    pub fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        // The root may have been removed behind our back
        fs::create_dir_all(&self.root)?;

        let path = self.path_for_key(key);
        write_atomically(&path, data)?;
        // A new payload invalidates the old metadata
        remove_if_exists(&with_suffix(&path, SIDECAR_SUFFIX))?;
        Ok(())
    }

    pub fn read_extended(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for_key(key);
        if !path.is_file() {
            return Ok(None);
        }

        let raw = match fs::read(with_suffix(&path, SIDECAR_SUFFIX)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(parse_sidecar(&raw)?.to_vec()))
    }

    /// Attach, replace, or (with `None`) drop a record's metadata.
    /// Returns `false` when there is no payload to attach to.
    pub fn write_extended(&self, key: &str, data: Option<&[u8]>) -> Result<bool> {
        let path = self.path_for_key(key);
        if !path.is_file() {
            return Ok(false);
        }

        let sidecar = with_suffix(&path, SIDECAR_SUFFIX);
        match data {
            Some(body) => write_atomically(&sidecar, &create_sidecar(body)?)?,
            None => remove_if_exists(&sidecar)?,
        }
        Ok(true)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.remove_file_name(&file_name_for_key(key))
    }

    fn remove_file_name(&self, name: &str) -> Result<()> {
        let path = self.root.join(name);
        remove_if_exists(&path)?;
        remove_if_exists(&with_suffix(&path, SIDECAR_SUFFIX))?;
        Ok(())
    }

    pub fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Scan the root for records
    pub fn records(&self) -> Result<Vec<RecordInfo>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) if !name.contains('.') => name,
                _ => continue,
            };

            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to stat cache record");
                    continue;
                }
            };

            let last_access = match self.config.expire_type {
                ExpireType::AccessDate => meta.accessed().or_else(|_| meta.modified()),
                ExpireType::ModificationDate => meta.modified(),
            }?;

            records.push(RecordInfo {
                name,
                size: meta.len(),
                last_access,
            });
        }

        Ok(records)
    }

    /// Delete stale records, then least recently accessed ones until within quota
    pub fn sweep(&self, now: SystemTime) -> Result<SweepReport> {
        let cutoff = self
            .config
            .disk_age_limit()
            .and_then(|age| now.checked_sub(age));

        let mut report = SweepReport::default();
        let mut survivors = Vec::new();

        for record in self.records()? {
            match cutoff {
                Some(cutoff) if record.last_access < cutoff => {
                    match self.remove_file_name(&record.name) {
                        Ok(()) => report.expired += 1,
                        Err(e) => {
                            warn!(name = %record.name, error = %e, "Failed to remove expired record");
                            survivors.push(record);
                        }
                    }
                }
                _ => survivors.push(record),
            }
        }

        let mut count = survivors.len() as u64;
        let mut size: u64 = survivors.iter().map(|r| r.size).sum();
        let count_limit = self.config.disk_count_limit.unwrap_or(u64::MAX);
        let size_limit = self.config.disk_size_limit.unwrap_or(u64::MAX);

        if count > count_limit || size > size_limit {
            survivors.sort_by(|a, b| {
                a.last_access
                    .cmp(&b.last_access)
                    .then_with(|| a.name.cmp(&b.name))
            });

            for record in &survivors {
                if count <= count_limit && size <= size_limit {
                    break;
                }
                match self.remove_file_name(&record.name) {
                    Ok(()) => {
                        count -= 1;
                        size -= record.size;
                        report.evicted += 1;
                    }
                    Err(e) => {
                        warn!(name = %record.name, error = %e, "Failed to evict record")
                    }
                }
            }
        }

        report.remaining_count = count;
        report.remaining_size = size;
        debug!(
            expired = report.expired,
            evicted = report.evicted,
            remaining = count,
            "Disk sweep finished"
        );
        Ok(report)
    }

    /// Switch to a new root, carrying records over when configured to
    pub fn relocate(&mut self, new_root: PathBuf) -> Result<()> {
        if new_root == self.root {
            return Ok(());
        }

        if self.config.migrate_on_root_change {
            move_cache_directory(&self.root, &new_root)?;
        }
        fs::create_dir_all(&new_root)?;
        self.root = new_root;
        Ok(())
    }
}
