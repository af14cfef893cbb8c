use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jobclock_core::{
    days_between, drain_time, parse_timestamp, remaining_days, DrainError, DrainEstimate, QueueEntry,
    RuntimeStatistic, MATCH_ALL,
};
use jobclock_source::{FetchError, QueueSource};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::RuntimeModel;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Drain(#[from] DrainError),
}

/// Remaining time of one running job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InFlight {
    pub job_type: String,
    pub remaining_days: f64,
}

/// Queue-level timing built from per-type runtime estimates.
///
/// Best effort: only the first `queue_sample_size` entries the queue source returns are
/// considered, and job types are assumed to run on any node.
pub struct QueueTimeAggregator<'a> {
    queue: &'a dyn QueueSource,
    model: &'a dyn RuntimeModel,
    queued_status: String,
    started_status: String,
    sample_limit: usize,
}

impl<'a> QueueTimeAggregator<'a> {
    pub fn new(
        queue: &'a dyn QueueSource,
        model: &'a dyn RuntimeModel,
        queued_status: impl Into<String>,
        started_status: impl Into<String>,
        sample_limit: usize,
    ) -> Self {
        Self {
            queue,
            model,
            queued_status: queued_status.into(),
            started_status: started_status.into(),
            sample_limit,
        }
    }

    pub fn estimate_queue_drain(&self, node_count: u32, queue_sample_size: usize) -> Result<DrainEstimate, QueueError> {
        if node_count == 0 {
            return Err(DrainError::NoNodes.into());
        }
        let entries = self.queue.fetch_queue(&self.queued_status, queue_sample_size)?;
        if entries.is_empty() {
            return Ok(DrainEstimate::EMPTY);
        }

        let mut estimates: HashMap<String, RuntimeStatistic> = HashMap::new();
        for e in &entries {
            if !estimates.contains_key(&e.job_type) {
                let stat = self.model.estimate(&e.job_type, MATCH_ALL, self.sample_limit);
                debug!(job_type = %e.job_type, point = stat.point, spread = stat.spread, "type estimate");
                estimates.insert(e.job_type.clone(), stat);
            }
        }

        let drain = drain_time(entries.iter().map(|e| e.job_type.as_str()), &estimates, node_count)?;
        info!(
            jobs = drain.job_count,
            types = estimates.len(),
            node_count,
            min_days = drain.min_days,
            max_days = drain.max_days,
            "queue drain estimate"
        );
        Ok(drain)
    }

    /// Days until `entry` finishes, zero once it has overrun its estimate.
    pub fn time_remaining(&self, entry: &QueueEntry, now: DateTime<Utc>) -> f64 {
        let stat = self.model.estimate(&entry.job_type, MATCH_ALL, self.sample_limit);
        let elapsed = entry
            .start_time
            .as_deref()
            .and_then(parse_timestamp)
            .map(|start| days_between(&start, &now))
            .unwrap_or(0.0);
        remaining_days(stat.point, elapsed)
    }

    pub fn estimate_in_flight(&self, sample_size: usize, now: DateTime<Utc>) -> Result<Vec<InFlight>, QueueError> {
        let entries = self.queue.fetch_queue(&self.started_status, sample_size)?;
        Ok(entries
            .iter()
            .map(|e| InFlight {
                job_type: e.job_type.clone(),
                remaining_days: self.time_remaining(e, now),
            })
            .collect())
    }
}
