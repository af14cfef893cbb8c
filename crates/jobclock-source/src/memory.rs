use std::cell::{Cell, RefCell};

use jobclock_core::{parse_timestamp, QueueEntry, MATCH_ALL};
use serde_json::Value;

use crate::{FetchError, FetchResult, Page, PageRequest, QueueSource, TelemetrySource};

/// In-memory telemetry source for tests.
///
/// Holds completed-job hits (filtered by type, status-agnostic, timestamp bound and paging
/// exactly like the remote query) and a fixed queue snapshot. Failures can be scripted per call.
#[derive(Default)]
pub struct RecordedSource {
    hits: RefCell<Vec<Value>>,
    queue: RefCell<Vec<QueueEntry>>,
    fail_on_call: Cell<Option<(usize, bool)>>,
    calls: Cell<usize>,
    requests: RefCell<Vec<(Option<String>, usize, usize)>>,
}

impl RecordedSource {
    pub fn new(hits: Vec<Value>) -> Self {
        let s = Self::default();
        s.set_hits(hits);
        s
    }

    pub fn with_queue(queue: Vec<QueueEntry>) -> Self {
        let s = Self::default();
        *s.queue.borrow_mut() = queue;
        s
    }

    pub fn set_hits(&self, mut hits: Vec<Value>) {
        hits.sort_by(|a, b| timestamp_of(a).cmp(&timestamp_of(b)));
        *self.hits.borrow_mut() = hits;
    }

    pub fn push_hits(&self, more: Vec<Value>) {
        let mut all = self.hits.borrow().clone();
        all.extend(more);
        self.set_hits(all);
    }

    /// Make the n-th `fetch_page` call (0-based) fail, transiently or with a protocol error.
    pub fn fail_on_call(&self, n: usize, transient: bool) {
        self.fail_on_call.set(Some((n, transient)));
    }

    /// Drop any scripted failure; later calls succeed.
    pub fn recover(&self) {
        self.fail_on_call.set(None);
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// `(after, offset, size)` of every page request seen so far.
    pub fn requests(&self) -> Vec<(Option<String>, usize, usize)> {
        self.requests.borrow().clone()
    }
}

fn timestamp_of(hit: &Value) -> String {
    hit["_source"]["@timestamp"].as_str().unwrap_or_default().to_string()
}

fn type_matches(pattern: &str, value: &str) -> bool {
    // only a trailing "*" glob, enough for tests
    match pattern.strip_suffix(MATCH_ALL) {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

impl TelemetrySource for RecordedSource {
    fn fetch_page(&self, req: &PageRequest<'_>) -> FetchResult<Page> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        self.requests
            .borrow_mut()
            .push((req.after.map(str::to_string), req.offset, req.size));

        if let Some((n, transient)) = self.fail_on_call.get() {
            if n == call {
                return Err(if transient {
                    FetchError::Transient("scripted outage".into())
                } else {
                    FetchError::Protocol("scripted garbage".into())
                });
            }
        }

        let after = req.after.and_then(parse_timestamp);
        let hits = self.hits.borrow();
        let matching: Vec<&Value> = hits
            .iter()
            .filter(|h| type_matches(req.job_type, h["_source"]["type"].as_str().unwrap_or_default()))
            .filter(|h| match (&after, parse_timestamp(&timestamp_of(h))) {
                (Some(bound), Some(ts)) => ts > *bound,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();

        Ok(Page {
            total: matching.len() as u64,
            hits: matching.into_iter().skip(req.offset).take(req.size).cloned().collect(),
        })
    }
}

impl QueueSource for RecordedSource {
    fn fetch_queue(&self, _status: &str, limit: usize) -> FetchResult<Vec<QueueEntry>> {
        Ok(self.queue.borrow().iter().take(limit).cloned().collect())
    }
}
