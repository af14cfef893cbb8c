use jobclock_core::{JobRecord, RecordKey};

use crate::MirrorResult;

/// Durable, deduplicated store of completed job records.
///
/// Dedup is an existence check right before each insert; there is no storage-level
/// uniqueness constraint, so a mirror assumes a single writer.
pub trait Mirror: Send + Sync {
    fn create_if_absent(&self) -> MirrorResult<()>;

    /// Latest record timestamp, the sync watermark. `None` when empty.
    fn max_timestamp(&self) -> MirrorResult<Option<String>>;

    fn exists(&self, key: RecordKey<'_>) -> MirrorResult<bool>;
    fn insert(&self, record: &JobRecord) -> MirrorResult<()>;

    /// Records matching exact values or `*`, newest first (timestamp, then insertion order).
    fn query(&self, job_type: &str, instance: &str, limit: Option<usize>) -> MirrorResult<Vec<JobRecord>>;

    fn count(&self) -> MirrorResult<u64>;

    /// Insert unless a record with the same key is already present. Returns whether a row was written.
    fn insert_if_absent(&self, record: &JobRecord) -> MirrorResult<bool> {
        if self.exists(record.key())? {
            return Ok(false);
        }
        self.insert(record)?;
        Ok(true)
    }
}
