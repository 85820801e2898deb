use crate::errors::{MonitorError, Result};
use crate::market_data::constituents::ConstituentRecord;
use crate::models::PriceBar;
use chrono::{Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Flat JSON cache partitioned by day; entries are only valid on the day written
pub struct PriceCache {
    root: PathBuf,
    day: NaiveDate,
}

impl PriceCache {
    pub fn for_day(root: impl Into<PathBuf>, day: NaiveDate) -> Self {
        Self {
            root: root.into(),
            day,
        }
    }

    fn day_dir(&self) -> PathBuf {
        self.root.join(self.day.format(DAY_FORMAT).to_string())
    }

    fn history_path(&self, code: &str) -> PathBuf {
        self.day_dir().join(format!("{}.json", code))
    }

    fn constituents_path(&self, index: &str) -> PathBuf {
        self.day_dir().join(format!("index_{}.json", index))
    }

    pub fn load_history(&self, code: &str) -> Result<Option<Vec<PriceBar>>> {
        read_json(&self.history_path(code))
    }

    pub fn store_history(&self, code: &str, bars: &[PriceBar]) -> Result<()> {
        write_json(&self.history_path(code), &bars)
    }

    pub fn load_constituents(&self, index: &str) -> Result<Option<Vec<ConstituentRecord>>> {
        read_json(&self.constituents_path(index))
    }

    pub fn store_constituents(&self, index: &str, records: &[ConstituentRecord]) -> Result<()> {
        write_json(&self.constituents_path(index), &records)
    }

    /// Remove day directories older than `retention_days`
    pub fn prune(&self, retention_days: i64) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let Some(cutoff) = Duration::try_days(retention_days.max(0))
            .and_then(|span| self.day.checked_sub_signed(span))
        else {
            return Ok(0);
        };
        let mut removed = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(day) = name
                .to_str()
                .and_then(|n| NaiveDate::parse_from_str(n, DAY_FORMAT).ok())
            else {
                continue;
            };
            if day < cutoff {
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Pruned {} stale cache directories", removed);
        }
        Ok(removed)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value = serde_json::from_str(&content).map_err(|e| {
        MonitorError::StorageError(format!("Corrupt cache file {}: {}", path.display(), e))
    })?;
    debug!("Cache hit: {}", path.display());
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Replace via rename so readers never see a partial entry
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
