use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EPOCH_START: &str = "2020-01-01T00:00:00";

/// Everything the sync engine and estimators need, passed explicitly at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_endpoint: String,
    pub source_index: String,
    pub mirror_path: String,
    pub page_size: usize,
    /// Watermark used when the mirror is empty.
    pub epoch_start: String,

    pub completed_status: String,
    pub queued_status: String,
    pub started_status: String,

    /// Newest runs considered per estimate.
    pub sample_limit: usize,
    pub lock_wait_secs: u64,
    pub request_timeout_secs: u64,
    /// A sync lock older than this is treated as left behind by a dead process.
    pub sync_lock_ttl_secs: u64,

    /// USD per hour, keyed by instance type.
    pub instance_costs: HashMap<String, f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_endpoint: "http://localhost:9200".to_string(),
            source_index: "_search".to_string(),
            mirror_path: "job.db".to_string(),
            page_size: 1000,
            epoch_start: DEFAULT_EPOCH_START.to_string(),
            completed_status: "job-completed".to_string(),
            queued_status: "job-queued".to_string(),
            started_status: "job-started".to_string(),
            sample_limit: 100,
            lock_wait_secs: 30,
            request_timeout_secs: 60,
            sync_lock_ttl_secs: 6 * 60 * 60,
            instance_costs: HashMap::from([("c5.9xlarge".to_string(), 0.0)]),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.page_size > 0, "page_size must be positive");
        anyhow::ensure!(self.sample_limit > 0, "sample_limit must be positive");
        anyhow::ensure!(
            jobclock_core::parse_timestamp(&self.epoch_start).is_some(),
            "epoch_start {:?} is not an ISO-8601 timestamp",
            self.epoch_start
        );
        Ok(())
    }

    pub fn mirror_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.mirror_path).to_string())
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.sync_lock_ttl_secs)
    }

    pub fn hourly_rate(&self, instance: &str) -> f64 {
        self.instance_costs.get(instance).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobclock.toml");
        std::fs::write(&path, "source_endpoint = \"http://es:9200\"\npage_size = 50\n").unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.source_endpoint, "http://es:9200");
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.epoch_start, DEFAULT_EPOCH_START);
        assert_eq!(cfg.mirror_path, "job.db");
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("jobclock.toml");
        let mut cfg = Config::default();
        cfg.instance_costs.insert("m5.large".into(), 0.096);
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn rejects_bad_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobclock.toml");
        std::fs::write(&path, "page_size = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
        std::fs::write(&path, "epoch_start = \"last tuesday\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn unknown_instance_costs_nothing() {
        assert_eq!(Config::default().hourly_rate("x1.32xlarge"), 0.0);
    }
}
