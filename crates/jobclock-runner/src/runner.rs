use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jobclock_core::{days_to_seconds, now_utc, DrainEstimate};
use jobclock_source::ElasticSource;
use jobclock_storage::{InMemoryMirror, Mirror};
use jobclock_storage_sqlite::SqliteMirror;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    Config, InFlight, QueueTimeAggregator, RuntimeEstimator, RuntimeModel, SyncEngine, SyncError, SyncGuard,
    SyncReport, SyncSettings,
};

pub const DEFAULT_QUEUE_SAMPLE: usize = 4444;

/// `runtime` answer, in seconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuntimeReport {
    pub name: String,
    pub instance: String,
    pub mean: String,
    pub stdev: String,
    pub samples: usize,
    pub units: &'static str,
}

/// `runcost` answer, in USD.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostReport {
    pub name: String,
    pub instance: String,
    pub mean: String,
    pub stdev: String,
    pub units: &'static str,
}

/// `queue` answer, in days.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueReport {
    pub name: &'static str,
    pub njobs: usize,
    pub nodes: u32,
    pub min: String,
    pub max: String,
    pub units: &'static str,
}

impl QueueReport {
    fn from_estimate(d: DrainEstimate, nodes: u32) -> Self {
        Self {
            name: "Queue Time Estimate",
            njobs: d.job_count,
            nodes,
            min: format!("{:.3}", d.min_days),
            max: format!("{:.3}", d.max_days),
            units: "day",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RemainingReport {
    pub name: &'static str,
    pub jobs: Vec<InFlight>,
    pub units: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusReport {
    pub mirror_path: PathBuf,
    pub mirror_present: bool,
    pub records: u64,
    pub watermark: Option<String>,
    pub sync_running: bool,
}

pub struct Runner {
    pub cfg: Config,
}

impl Runner {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// Load `config_path` when given, defaults otherwise.
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let cfg = match config_path {
            Some(p) => Config::load_from(p)?,
            None => Config::default(),
        };
        Ok(Self::new(cfg))
    }

    fn lock_path(&self) -> PathBuf {
        let mirror_path = self.cfg.mirror_path();
        let key = SyncGuard::sync_key(&self.cfg.source_endpoint, &self.cfg.source_index, &mirror_path);
        SyncGuard::lock_path(&mirror_path, &key)
    }

    /// One guarded sync cycle against the configured source and mirror.
    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = SyncGuard::try_acquire(&self.lock_path(), self.cfg.sync_lock_ttl())?;
        let mirror = SqliteMirror::create(&self.cfg.mirror_path(), self.cfg.lock_wait())?;
        let source = ElasticSource::new(
            &self.cfg.source_endpoint,
            &self.cfg.source_index,
            self.cfg.request_timeout(),
        )?;
        info!(source = %source.search_url(), mirror = %mirror.path().display(), "sync starting");
        SyncEngine::new(&source, &mirror, SyncSettings::from_config(&self.cfg)).run()
    }

    /// Mirror for the read path. A missing or locked file reads as an empty mirror.
    pub fn open_mirror_for_read(&self) -> Box<dyn Mirror> {
        let path = self.cfg.mirror_path();
        match SqliteMirror::open_existing(&path, self.cfg.lock_wait()) {
            Ok(m) => Box::new(m),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "mirror unavailable; estimating without history");
                Box::new(InMemoryMirror::new())
            }
        }
    }

    fn source(&self) -> Result<ElasticSource> {
        ElasticSource::new(
            &self.cfg.source_endpoint,
            &self.cfg.source_index,
            self.cfg.request_timeout(),
        )
        .context("build telemetry source client")
    }

    pub fn runtime(&self, job_type: &str, instance: &str, sample_limit: Option<usize>) -> RuntimeReport {
        let mirror = self.open_mirror_for_read();
        let stat = RuntimeEstimator::new(mirror.as_ref()).estimate(
            job_type,
            instance,
            sample_limit.unwrap_or(self.cfg.sample_limit),
        );
        RuntimeReport {
            name: job_type.to_string(),
            instance: instance.to_string(),
            mean: format!("{:.2}", days_to_seconds(stat.point)),
            stdev: format!("{:.2}", days_to_seconds(stat.spread)),
            samples: stat.sample_count,
            units: "seconds",
        }
    }

    pub fn run_cost(&self, job_type: &str, instance: &str) -> CostReport {
        let mirror = self.open_mirror_for_read();
        let cost = RuntimeEstimator::new(mirror.as_ref()).run_cost(
            job_type,
            instance,
            self.cfg.sample_limit,
            self.cfg.hourly_rate(instance),
        );
        CostReport {
            name: job_type.to_string(),
            instance: instance.to_string(),
            mean: format!("{:.2}", cost.mean),
            stdev: format!("{:.2}", cost.stdev),
            units: "USD",
        }
    }

    pub fn queue_drain(&self, nodes: u32, size: usize) -> Result<QueueReport> {
        let mirror = self.open_mirror_for_read();
        let estimator = RuntimeEstimator::new(mirror.as_ref());
        let source = self.source()?;
        let agg = self.aggregator(&source, &estimator);
        let d = agg.estimate_queue_drain(nodes, size).context("estimate queue drain")?;
        Ok(QueueReport::from_estimate(d, nodes))
    }

    pub fn in_flight(&self, size: usize) -> Result<RemainingReport> {
        let mirror = self.open_mirror_for_read();
        let estimator = RuntimeEstimator::new(mirror.as_ref());
        let source = self.source()?;
        let jobs = self
            .aggregator(&source, &estimator)
            .estimate_in_flight(size, now_utc())
            .context("estimate in-flight jobs")?;
        info!(jobs = jobs.len(), "in-flight estimate");
        Ok(RemainingReport {
            name: "Time Remaining Estimate",
            jobs,
            units: "day",
        })
    }

    fn aggregator<'a>(&self, source: &'a ElasticSource, model: &'a dyn RuntimeModel) -> QueueTimeAggregator<'a> {
        QueueTimeAggregator::new(
            source,
            model,
            self.cfg.queued_status.clone(),
            self.cfg.started_status.clone(),
            self.cfg.sample_limit,
        )
    }

    /// Local view only; never contacts the telemetry source.
    pub fn status(&self) -> Result<StatusReport> {
        let path = self.cfg.mirror_path();
        let sync_running = self.lock_path().exists();
        if !path.exists() {
            return Ok(StatusReport {
                mirror_path: path,
                mirror_present: false,
                records: 0,
                watermark: None,
                sync_running,
            });
        }
        let mirror = SqliteMirror::open_existing(&path, self.cfg.lock_wait())
            .with_context(|| format!("open mirror {}", path.display()))?;
        Ok(StatusReport {
            records: mirror.count()?,
            watermark: mirror.max_timestamp()?,
            mirror_path: path,
            mirror_present: true,
            sync_running,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobclock_core::JobRecord;
    use jobclock_storage_sqlite::DEFAULT_LOCK_WAIT;
    use tempfile::tempdir;

    fn runner_at(db: &Path) -> Runner {
        Runner::new(Config {
            mirror_path: db.to_string_lossy().into_owned(),
            instance_costs: [("c5.9xlarge".to_string(), 2.0)].into_iter().collect(),
            ..Config::default()
        })
    }

    fn seed(db: &Path, days: &[f64]) {
        let m = SqliteMirror::create(db, DEFAULT_LOCK_WAIT).unwrap();
        for (i, d) in days.iter().enumerate() {
            m.insert(&JobRecord {
                job_type: "job-standard".into(),
                instance: "c5.9xlarge".into(),
                run_time: *d,
                timestamp: format!("2021-01-01T00:00:{:02}Z", i),
                metrics: None,
            })
            .unwrap();
        }
    }

    #[test]
    fn missing_mirror_reads_as_no_history() {
        let dir = tempdir().unwrap();
        let r = runner_at(&dir.path().join("absent.db"));
        let rt = r.runtime("job-standard", "*", None);
        assert_eq!((rt.mean.as_str(), rt.stdev.as_str(), rt.samples), ("0.00", "0.00", 0));

        let st = r.status().unwrap();
        assert!(!st.mirror_present);
        assert_eq!(st.records, 0);
        assert!(!st.sync_running);
        // reading must not create the file
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn runtime_and_cost_from_mirror() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("job.db");
        seed(&db, &[0.5, 0.5, 0.5]);
        let r = runner_at(&db);

        let rt = r.runtime("job-standard", "c5.9xlarge", None);
        assert_eq!(rt.mean, "43200.00");
        assert_eq!(rt.units, "seconds");

        let cost = r.run_cost("job-standard", "c5.9xlarge");
        assert_eq!(cost.mean, "24.00");
        assert_eq!(cost.units, "USD");
        assert_eq!(r.run_cost("job-standard", "*").mean, "0.00");

        let st = r.status().unwrap();
        assert_eq!(st.records, 3);
        assert_eq!(st.watermark.as_deref(), Some("2021-01-01T00:00:02Z"));
    }

    #[test]
    fn status_sees_a_held_sync_lock() {
        let dir = tempdir().unwrap();
        let r = runner_at(&dir.path().join("job.db"));
        let _held = SyncGuard::try_acquire(&r.lock_path(), r.cfg.sync_lock_ttl()).unwrap();
        assert!(r.status().unwrap().sync_running);

        let err = r.sync().unwrap_err();
        assert!(matches!(err, SyncError::Guard(crate::GuardError::Held { .. })));
    }

    #[test]
    fn first_sync_into_a_new_directory_reaches_the_source() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("nested").join("deeper").join("job.db");
        let mut r = runner_at(&db);
        // nothing listens here; the cycle must get as far as the fetch
        r.cfg.source_endpoint = "http://127.0.0.1:1".to_string();
        r.cfg.request_timeout_secs = 5;

        let err = r.sync().unwrap_err();
        assert!(matches!(err, SyncError::Fetch(ref f) if f.is_transient()), "{err}");
        assert!(db.exists());
        assert!(!r.lock_path().exists());
    }
}
