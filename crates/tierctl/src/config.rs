//! Config loading for tierctl

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tiercache::CacheConfig;

/// Limit overrides given on the command line
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub age_limit: Option<u64>,
    pub size_limit: Option<u64>,
    pub count_limit: Option<u64>,
}

/// Load a config from an optional JSON file, then apply CLI overrides
///
/// An age limit of zero disables age-based expiry.
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<CacheConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file {:?}", path))?
        }
        None => CacheConfig::default(),
    };

    if let Some(secs) = overrides.age_limit {
        config.disk_age_limit_secs = (secs > 0).then_some(secs);
    }
    if let Some(bytes) = overrides.size_limit {
        config.disk_size_limit = Some(bytes);
    }
    if let Some(count) = overrides.count_limit {
        config.disk_count_limit = Some(count);
    }

    Ok(config)
}
