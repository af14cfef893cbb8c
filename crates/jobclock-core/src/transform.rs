//! Maps a raw telemetry search hit into a [`JobRecord`].
//!
//! Hits look like
//! `{"_source": {"@timestamp", "type", "job": {"job_info": {"time_queued", "time_start",
//! "time_end", "facts": {"ec2_instance_type"}, "metrics"}}}}`. Any field may be missing; the
//! transformer never fails and instead produces a zero run time, which marks the record invalid.

use serde_json::Value;

use crate::{days_between, parse_timestamp, JobRecord, QueueEntry, TransformedHit};

pub fn transform(hit: &Value) -> TransformedHit {
    let source = &hit["_source"];
    let info = &source["job"]["job_info"];

    let queued = timestamp_at(&info["time_queued"]);
    let start = timestamp_at(&info["time_start"]);
    let end = timestamp_at(&info["time_end"]);

    let (run_time, queue_time) = match (queued, start, end) {
        (Some(q), Some(s), Some(e)) => (days_between(&s, &e), days_between(&q, &s)),
        _ => (0.0, 0.0),
    };

    let metrics = match &info["metrics"] {
        Value::Null => None,
        m => serde_json::to_string(m).ok(),
    };

    TransformedHit {
        record: JobRecord {
            job_type: string_at(&source["type"]),
            instance: string_at(&info["facts"]["ec2_instance_type"]),
            run_time,
            timestamp: string_at(&source["@timestamp"]),
            metrics,
        },
        queue_time,
    }
}

/// Transform a page and keep only the hits worth persisting.
///
/// Returns the survivors (with their queue time) and the number of hits dropped as invalid.
pub fn valid_hits(hits: &[Value]) -> (Vec<TransformedHit>, usize) {
    let mut dropped = 0;
    let valid = hits
        .iter()
        .map(transform)
        .filter(|t| {
            let keep = t.is_valid();
            if !keep {
                dropped += 1;
            }
            keep
        })
        .collect();
    (valid, dropped)
}

/// Map a queue-status hit into a [`QueueEntry`]; `None` when it carries no job type.
pub fn queue_entry(hit: &Value) -> Option<QueueEntry> {
    let source = &hit["_source"];
    let job_type = source["type"].as_str()?.to_string();
    let info = &source["job"]["job_info"];
    Some(QueueEntry {
        job_type,
        enqueue_time: info["time_queued"].as_str().map(str::to_string),
        start_time: info["time_start"].as_str().map(str::to_string),
    })
}

fn timestamp_at(v: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    v.as_str().and_then(parse_timestamp)
}

fn string_at(v: &Value) -> String {
    v.as_str().unwrap_or_default().to_string()
}
