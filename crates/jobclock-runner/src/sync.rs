//! Watermark-driven incremental sync from the telemetry source into the mirror.
//!
//! One cycle walks INIT -> DETERMINE_WATERMARK -> PROBE_TOTAL -> PAGE_LOOP -> DONE, or ends in
//! FAILED on a fetch or storage error. The watermark is re-derived from the mirror on every
//! cycle, so a crashed or failed cycle is resumed simply by running again: overlap near the
//! boundary is absorbed by dedup.
//!
//! The engine does not exclude concurrent invocations itself; callers hold a
//! [`crate::SyncGuard`]. Without one, a watermark read racing another writer's insert is a
//! known limitation.
//!
//! Paging is by `from` offset under a fixed watermark. Elasticsearch refuses `from + size` past
//! the index's `max_result_window` (10,000 by default) with HTTP 400, which surfaces as
//! [`FetchError::Protocol`]. A first sync against a larger backlog therefore ends FAILED after
//! roughly that many rows; everything before the failure is committed, so each rerun advances
//! the watermark by up to one window until the backlog is drained.

use jobclock_core::{valid_hits, MATCH_ALL};
use jobclock_source::{FetchError, PageRequest, TelemetrySource};
use jobclock_storage::{Mirror, MirrorError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{Config, GuardError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] MirrorError),
    #[error(transparent)]
    Guard(#[from] GuardError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Init,
    DetermineWatermark,
    ProbeTotal,
    PageLoop { offset: usize },
    Done,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    pub job_type: String,
    pub instance: String,
    pub status: String,
    pub page_size: usize,
    pub epoch_start: String,
}

impl SyncSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            job_type: MATCH_ALL.to_string(),
            instance: MATCH_ALL.to_string(),
            status: cfg.completed_status.clone(),
            page_size: cfg.page_size.max(1),
            epoch_start: cfg.epoch_start.clone(),
        }
    }
}

/// Outcome of one completed cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub watermark_before: String,
    pub watermark_after: String,
    /// Probed match count; bounds this cycle only.
    pub total: u64,
    pub pages: usize,
    pub fetched: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub inserted: usize,
}

pub struct SyncEngine<'a, S: TelemetrySource + ?Sized, M: Mirror + ?Sized> {
    source: &'a S,
    mirror: &'a M,
    settings: SyncSettings,
    phase: SyncPhase,
}

impl<'a, S: TelemetrySource + ?Sized, M: Mirror + ?Sized> SyncEngine<'a, S, M> {
    pub fn new(source: &'a S, mirror: &'a M, settings: SyncSettings) -> Self {
        Self {
            source,
            mirror,
            settings,
            phase: SyncPhase::Init,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Run one cycle. Pages committed before a failure stay committed.
    pub fn run(&mut self) -> Result<SyncReport, SyncError> {
        self.enter(SyncPhase::Init);
        match self.cycle() {
            Ok(report) => {
                self.enter(SyncPhase::Done);
                info!(
                    inserted = report.inserted,
                    duplicates = report.duplicates,
                    invalid = report.invalid,
                    watermark = %report.watermark_after,
                    "sync cycle complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(phase = ?self.phase, error = %e, "sync cycle failed");
                self.enter(SyncPhase::Failed);
                Err(e)
            }
        }
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!(from = ?self.phase, to = ?phase, "sync phase");
        self.phase = phase;
    }

    fn cycle(&mut self) -> Result<SyncReport, SyncError> {
        self.enter(SyncPhase::DetermineWatermark);
        self.mirror.create_if_absent()?;
        let watermark = self
            .mirror
            .max_timestamp()?
            .unwrap_or_else(|| self.settings.epoch_start.clone());
        info!(watermark = %watermark, "resuming after watermark");

        self.enter(SyncPhase::ProbeTotal);
        let probe = self.source.fetch_page(&self.request(&watermark, 0, 1))?;
        let total = probe.total;
        info!(total, page_size = self.settings.page_size, "probed source");

        let mut report = SyncReport {
            watermark_before: watermark.clone(),
            total,
            ..Default::default()
        };

        let mut offset = 0usize;
        while (offset as u64) < total {
            self.enter(SyncPhase::PageLoop { offset });
            let page = self
                .source
                .fetch_page(&self.request(&watermark, offset, self.settings.page_size))?;
            if page.hits.is_empty() {
                // source shrank since the probe
                debug!(offset, "empty page; stopping early");
                break;
            }

            let (valid, invalid) = valid_hits(&page.hits);
            let mut inserted = 0;
            for hit in &valid {
                let record = &hit.record;
                debug!(
                    job_type = %record.job_type,
                    timestamp = %record.timestamp,
                    run_time_days = record.run_time,
                    queue_time_days = hit.queue_time,
                    "record"
                );
                if self.mirror.insert_if_absent(record)? {
                    inserted += 1;
                } else {
                    report.duplicates += 1;
                }
            }
            info!(
                offset,
                fetched = page.hits.len(),
                invalid,
                inserted,
                first = %valid.first().map(|h| h.record.timestamp.as_str()).unwrap_or("-"),
                last = %valid.last().map(|h| h.record.timestamp.as_str()).unwrap_or("-"),
                "page synced"
            );

            report.pages += 1;
            report.fetched += page.hits.len();
            report.invalid += invalid;
            report.inserted += inserted;
            offset += self.settings.page_size;
        }

        report.watermark_after = self.mirror.max_timestamp()?.unwrap_or(watermark);
        Ok(report)
    }

    fn request<'r>(&'r self, watermark: &'r str, offset: usize, size: usize) -> PageRequest<'r> {
        PageRequest {
            job_type: &self.settings.job_type,
            instance: &self.settings.instance,
            status: &self.settings.status,
            after: Some(watermark),
            offset,
            size,
        }
    }
}
