use jobclock_core::QueueEntry;
use serde_json::Value;

use crate::FetchResult;

/// One page query against completed-job telemetry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest<'a> {
    /// Wildcard pattern; `*` matches any type.
    pub job_type: &'a str,
    /// Wildcard pattern over the executing instance; `*` matches any.
    pub instance: &'a str,
    pub status: &'a str,
    /// Exclusive lower bound on the document timestamp.
    pub after: Option<&'a str>,
    pub offset: usize,
    pub size: usize,
}

/// Hits in ascending timestamp order plus the total number of matches for the query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub hits: Vec<Value>,
    pub total: u64,
}

pub trait TelemetrySource {
    fn fetch_page(&self, req: &PageRequest<'_>) -> FetchResult<Page>;
}

/// Live view of queued or running jobs, oldest first.
pub trait QueueSource {
    fn fetch_queue(&self, status: &str, limit: usize) -> FetchResult<Vec<QueueEntry>>;
}
