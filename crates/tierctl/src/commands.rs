//! Subcommand implementations
//!
//! Every command writes its human-readable output to `out` so it can be
//! captured in tests.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tiercache::{Bytes, Cache, CacheType, TieredCache};
use tracing::info;

/// Summary printed by `stat`
#[derive(Debug, Serialize)]
pub struct Stat {
    pub root: String,
    pub count: u64,
    pub size: u64,
    pub age_limit_secs: Option<u64>,
    pub count_limit: Option<u64>,
    pub size_limit: Option<u64>,
    pub expire_type: String,
}

pub fn get(cache: &TieredCache, key: &str, dest: Option<&Path>, out: &mut impl Write) -> Result<()> {
    let (data, _) = cache
        .query(key)
        .ok_or_else(|| anyhow!("Key not found: {}", key))?;

    match dest {
        Some(path) => {
            fs::write(path, &data).with_context(|| format!("Failed to write {:?}", path))?;
            writeln!(out, "Wrote {} bytes to {}", data.len(), path.display())?;
        }
        None => out.write_all(&data)?,
    }
    Ok(())
}

pub fn put(cache: &TieredCache, key: &str, source: &Path, out: &mut impl Write) -> Result<()> {
    let data = fs::read(source).with_context(|| format!("Failed to read {:?}", source))?;
    let len = data.len();

    if !cache.store_to(key, Bytes::from(data), CacheType::Disk) {
        bail!("Failed to store key: {}", key);
    }
    writeln!(out, "Stored {} bytes under {}", len, key)?;
    Ok(())
}

pub fn remove(cache: &TieredCache, key: &str, out: &mut impl Write) -> Result<()> {
    let existed = cache.disk().contains(key);
    cache.remove_from(key, CacheType::Disk);
    writeln!(out, "{}", if existed { "Removed" } else { "Not found" })?;
    Ok(())
}

pub fn clear(cache: &TieredCache, out: &mut impl Write) -> Result<()> {
    let count = cache.total_count();
    cache.clear(CacheType::Disk);
    info!(count, "Cleared disk cache");
    writeln!(out, "Removed {} record(s)", count)?;
    Ok(())
}

pub fn stat(cache: &TieredCache, json: bool, out: &mut impl Write) -> Result<()> {
    let config = cache.disk().config();
    let stat = Stat {
        root: cache
            .disk()
            .root()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        count: cache.total_count(),
        size: cache.total_size(),
        age_limit_secs: config.disk_age_limit_secs,
        count_limit: config.disk_count_limit,
        size_limit: config.disk_size_limit,
        expire_type: format!("{:?}", config.expire_type),
    };

    if json {
        serde_json::to_writer_pretty(&mut *out, &stat)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Root:        {}", stat.root)?;
    writeln!(out, "Records:     {}", stat.count)?;
    writeln!(out, "Total size:  {} bytes", stat.size)?;
    writeln!(out, "Age limit:   {}", limit(stat.age_limit_secs, "s"))?;
    writeln!(out, "Count limit: {}", limit(stat.count_limit, ""))?;
    writeln!(out, "Size limit:  {}", limit(stat.size_limit, " bytes"))?;
    writeln!(out, "Expire by:   {}", stat.expire_type)?;
    Ok(())
}

fn limit(value: Option<u64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{}{}", v, unit),
        None => "none".to_string(),
    }
}

/// List records, most recently accessed first
pub fn list(cache: &TieredCache, out: &mut impl Write) -> Result<()> {
    let mut records = cache.disk().records();
    records.sort_by(|a, b| b.last_access.cmp(&a.last_access).then(a.name.cmp(&b.name)));

    for record in &records {
        let accessed: DateTime<Utc> = record.last_access.into();
        writeln!(
            out,
            "{}  {:>10}  {}",
            accessed.format("%Y-%m-%d %H:%M:%S"),
            record.size,
            record.name
        )?;
    }
    writeln!(out, "{} record(s)", records.len())?;
    Ok(())
}

pub fn sweep(cache: &TieredCache, out: &mut impl Write) -> Result<()> {
    let report = cache.sweep();
    writeln!(
        out,
        "Expired {}, evicted {}; {} record(s), {} bytes remain",
        report.expired, report.evicted, report.remaining_count, report.remaining_size
    )?;
    Ok(())
}

pub fn path(cache: &TieredCache, key: &str, out: &mut impl Write) -> Result<()> {
    let path = cache
        .cache_path(key)
        .ok_or_else(|| anyhow!("No path for key: {:?}", key))?;
    writeln!(out, "{}", path.display())?;
    Ok(())
}

pub fn migrate(from: &Path, to: &Path, out: &mut impl Write) -> Result<()> {
    tiercache::move_cache_directory(from, to)
        .with_context(|| format!("Failed to move {:?} to {:?}", from, to))?;
    writeln!(out, "Moved {} -> {}", from.display(), to.display())?;
    Ok(())
}

pub fn ext_get(cache: &TieredCache, key: &str, out: &mut impl Write) -> Result<()> {
    let data = cache
        .extended_data(key)
        .ok_or_else(|| anyhow!("No extended data for key: {}", key))?;
    out.write_all(&data)?;
    Ok(())
}

pub fn ext_set(cache: &TieredCache, key: &str, source: &Path, out: &mut impl Write) -> Result<()> {
    let data = fs::read(source).with_context(|| format!("Failed to read {:?}", source))?;

    if !cache.disk().set_extended(key, Some(Bytes::from(data))) {
        bail!("Key not found: {}", key);
    }
    writeln!(out, "Extended data set for {}", key)?;
    Ok(())
}
