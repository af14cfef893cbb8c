use std::sync::Mutex;

use jobclock_core::{JobRecord, Pattern, RecordKey};

use crate::traits::Mirror;
use crate::MirrorResult;

/// In-memory mirror for tests. Not durable, but keeps the same ordering and dedup rules.
#[derive(Default)]
pub struct InMemoryMirror {
    rows: Mutex<Vec<JobRecord>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        Self {
            rows: Mutex::new(records.into_iter().collect()),
        }
    }
}

impl Mirror for InMemoryMirror {
    fn create_if_absent(&self) -> MirrorResult<()> {
        Ok(())
    }

    fn max_timestamp(&self) -> MirrorResult<Option<String>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().map(|r| r.timestamp.clone()).max())
    }

    fn exists(&self, key: RecordKey<'_>) -> MirrorResult<bool> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().any(|r| r.key() == key))
    }

    fn insert(&self, record: &JobRecord) -> MirrorResult<()> {
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn query(&self, job_type: &str, instance: &str, limit: Option<usize>) -> MirrorResult<Vec<JobRecord>> {
        let (job_type, instance) = (Pattern::parse(job_type), Pattern::parse(instance));
        let rows = self.rows.lock().unwrap();
        // (timestamp DESC, insertion DESC) like the sqlite mirror
        let mut hits: Vec<(usize, &JobRecord)> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| job_type.matches(&r.job_type) && instance.matches(&r.instance))
            .collect();
        hits.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(hits
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn count(&self) -> MirrorResult<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ts: &str, ty: &str, inst: &str, run_time: f64) -> JobRecord {
        JobRecord {
            job_type: ty.into(),
            instance: inst.into(),
            run_time,
            timestamp: ts.into(),
            metrics: None,
        }
    }

    #[test]
    fn insert_if_absent_dedups() {
        let m = InMemoryMirror::new();
        let r = rec("2023-01-01T00:00:00", "a", "", 1.0);
        assert!(m.insert_if_absent(&r).unwrap());
        assert!(!m.insert_if_absent(&r).unwrap());
        assert_eq!(m.count().unwrap(), 1);
    }

    #[test]
    fn query_is_newest_first_and_limited() {
        let m = InMemoryMirror::with_records([
            rec("2023-01-01T00:00:00", "a", "x", 1.0),
            rec("2023-01-03T00:00:00", "a", "y", 3.0),
            rec("2023-01-02T00:00:00", "b", "x", 2.0),
        ]);
        let all = m.query("*", "*", None).unwrap();
        let times: Vec<f64> = all.iter().map(|r| r.run_time).collect();
        assert_eq!(times, vec![3.0, 2.0, 1.0]);
        assert_eq!(m.query("a", "*", Some(1)).unwrap()[0].run_time, 3.0);
        assert_eq!(m.query("*", "x", None).unwrap().len(), 2);
        assert_eq!(m.max_timestamp().unwrap().as_deref(), Some("2023-01-03T00:00:00"));
    }
}
