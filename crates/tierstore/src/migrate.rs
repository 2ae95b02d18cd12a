//! Cache directory relocation with merge semantics

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Move a cache directory from `src` to `dst`
///
/// - `src` missing: nothing happens.
/// - `dst` missing: the whole directory is renamed.
/// - `dst` is a directory: entries of `src` are moved into it one by one
///   (an entry that fails to move is logged and skipped, colliding names are
///   overwritten by `src`), then `src` is removed.
/// - `dst` exists but is not a directory: it is deleted, then `src` is renamed.
///
/// A `dst` inside `src` is rejected with [`io::ErrorKind::InvalidInput`]
/// before anything is touched.
pub fn move_cache_directory(src: &Path, dst: &Path) -> Result<()> {
    let resolved_src = resolve(src);
    let resolved_dst = resolve(dst);
    if resolved_src == resolved_dst {
        return Ok(());
    }

    match fs::metadata(src) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            warn!(src = ?src, "Migration source is not a directory, skipping");
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(src = ?src, "Migration source missing, nothing to move");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    if resolved_dst.starts_with(&resolved_src) {
        warn!(src = ?src, dst = ?dst, "Refusing to move cache directory into itself");
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{:?} is inside {:?}", dst, src),
        )
        .into());
    }

    match fs::symlink_metadata(dst) {
        Ok(meta) if meta.is_dir() => {
            let moved = merge_into(src, dst)?;
            info!(src = ?src, dst = ?dst, moved, "Merged cache directory");
        }
        Ok(_) => {
            fs::remove_file(dst)?;
            rename_dir(src, dst)?;
            info!(src = ?src, dst = ?dst, "Replaced non-directory with cache directory");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            rename_dir(src, dst)?;
            info!(src = ?src, dst = ?dst, "Moved cache directory");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Canonical form of `path`, resolving through its deepest existing ancestor
fn resolve(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;

    loop {
        if let Ok(canonical) = current.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn rename_dir(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Err(e) = fs::rename(src, dst) {
        // Rename cannot cross filesystems; fall back to a per-entry move
        debug!(error = %e, "Directory rename failed, merging entry by entry");
        fs::create_dir_all(dst)?;
        merge_into(src, dst)?;
    }

    Ok(())
}

/// Move every entry of `src` into `dst`, then delete `src`
fn merge_into(src: &Path, dst: &Path) -> Result<usize> {
    let mut moved = 0;

    for entry in fs::read_dir(src)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(src = ?src, error = %e, "Failed to read directory entry during merge");
                continue;
            }
        };

        let from = entry.path();
        let to = dst.join(entry.file_name());
        match move_entry(&from, &to) {
            Ok(()) => moved += 1,
            Err(e) => warn!(from = ?from, to = ?to, error = %e, "Failed to move cache entry"),
        }
    }

    fs::remove_dir_all(src)?;
    Ok(moved)
}

fn move_entry(from: &Path, to: &Path) -> io::Result<()> {
    if let Ok(meta) = fs::symlink_metadata(to) {
        if meta.is_dir() {
            fs::remove_dir_all(to)?;
        }
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) if from.is_file() => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
