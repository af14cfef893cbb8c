use serde::{Deserialize, Serialize};

/// One completed execution as stored in the mirror.
///
/// Identity is `(timestamp, job_type, instance)`; rows are append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    /// Empty when the telemetry carried no instance type ("unknown").
    pub instance: String,
    /// Run time in fractional days.
    pub run_time: f64,
    /// ISO-8601 identity time of the telemetry document.
    pub timestamp: String,
    pub metrics: Option<String>,
}

impl JobRecord {
    pub fn key(&self) -> RecordKey<'_> {
        RecordKey {
            timestamp: &self.timestamp,
            job_type: &self.job_type,
            instance: &self.instance,
        }
    }
}

/// Borrowed dedup key of a [`JobRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey<'a> {
    pub timestamp: &'a str,
    pub job_type: &'a str,
    pub instance: &'a str,
}

/// Output of the transformer: the record plus derived values that are not persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformedHit {
    pub record: JobRecord,
    /// Time spent queued before starting, in fractional days.
    pub queue_time: f64,
}

impl TransformedHit {
    /// Zero (or negative) run times and records without an identity time are never persisted.
    pub fn is_valid(&self) -> bool {
        self.record.run_time > 0.0 && !self.record.timestamp.is_empty()
    }
}

/// A queued or in-flight job reported by the live queue source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_type: String,
    pub enqueue_time: Option<String>,
    pub start_time: Option<String>,
}

/// Monetary estimate for one run, in USD.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub mean: f64,
    pub stdev: f64,
}

impl CostEstimate {
    /// `point`/`spread` in days, `hourly_rate` in USD per hour.
    pub fn from_days(point: f64, spread: f64, hourly_rate: f64) -> Self {
        Self {
            mean: point * 24.0 * hourly_rate,
            stdev: spread * 24.0 * hourly_rate,
        }
    }
}
