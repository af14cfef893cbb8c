use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use jobclock_core::{JobRecord, Pattern, RecordKey};
use jobclock_storage::{Mirror, MirrorError, MirrorResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags};
use tracing::debug;

pub const TABLE: &str = "job_times";
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

/// SQLite-backed mirror: one `job_times` table, one connection, one writer.
pub struct SqliteMirror {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteMirror {
    /// Open the mirror, creating the file and table when missing.
    pub fn create(db_path: &Path, lock_wait: Duration) -> MirrorResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let conn = Connection::open(db_path).map_err(|e| unavailable(db_path, e))?;
        let mirror = Self::from_connection(db_path, conn, lock_wait)?;
        mirror.create_if_absent()?;
        Ok(mirror)
    }

    /// Open an existing mirror file; a missing file is [`MirrorError::Unavailable`].
    pub fn open_existing(db_path: &Path, lock_wait: Duration) -> MirrorResult<Self> {
        if !db_path.is_file() {
            return Err(MirrorError::Unavailable {
                path: db_path.to_path_buf(),
                reason: "database file not found".into(),
            });
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags).map_err(|e| unavailable(db_path, e))?;
        Self::from_connection(db_path, conn, lock_wait)
    }

    fn from_connection(db_path: &Path, conn: Connection, lock_wait: Duration) -> MirrorResult<Self> {
        conn.busy_timeout(lock_wait).map_err(|e| unavailable(db_path, e))?;
        Ok(Self {
            path: db_path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MirrorResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MirrorError::Backend("mirror connection mutex poisoned".into()))
    }

    fn sql_err(&self, e: rusqlite::Error) -> MirrorError {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) =>
            {
                unavailable(&self.path, e)
            }
            _ => MirrorError::Backend(e.to_string()),
        }
    }
}

fn unavailable(path: &Path, e: rusqlite::Error) -> MirrorError {
    MirrorError::Unavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl Mirror for SqliteMirror {
    fn create_if_absent(&self) -> MirrorResult<()> {
        let conn = self.conn()?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).map_err(|e| self.sql_err(e))?;
        Ok(())
    }

    fn max_timestamp(&self) -> MirrorResult<Option<String>> {
        let conn = self.conn()?;
        conn.query_row("SELECT MAX(timestamp) FROM job_times", [], |r| r.get::<_, Option<String>>(0))
            .map_err(|e| self.sql_err(e))
    }

    fn exists(&self, key: RecordKey<'_>) -> MirrorResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(1) FROM job_times WHERE timestamp = ?1 AND job_type = ?2 AND instance = ?3",
                params![key.timestamp, key.job_type, key.instance],
                |r| r.get(0),
            )
            .map_err(|e| self.sql_err(e))?;
        Ok(count > 0)
    }

    fn insert(&self, record: &JobRecord) -> MirrorResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO job_times(job_type, instance, run_time, timestamp, metrics) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.job_type, record.instance, record.run_time, record.timestamp, record.metrics],
        )
        .map_err(|e| self.sql_err(e))?;
        Ok(())
    }

    fn query(&self, job_type: &str, instance: &str, limit: Option<usize>) -> MirrorResult<Vec<JobRecord>> {
        let job_type = Pattern::parse(job_type);
        let instance = Pattern::parse(instance);

        let mut conditions = vec![];
        let mut values: Vec<Value> = vec![];
        if let Some(v) = job_type.exact() {
            conditions.push(format!("job_type = ?{}", values.len() + 1));
            values.push(Value::Text(v.to_string()));
        }
        if let Some(v) = instance.exact() {
            conditions.push(format!("instance = ?{}", values.len() + 1));
            values.push(Value::Text(v.to_string()));
        }
        // negative LIMIT means unbounded in sqlite
        let limit_idx = values.len() + 1;
        values.push(Value::Integer(limit.map(|l| l as i64).unwrap_or(-1)));

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT job_type, instance, run_time, timestamp, metrics FROM job_times{where_clause} \
             ORDER BY timestamp DESC, uid DESC LIMIT ?{limit_idx}"
        );
        debug!(sql = %sql, "mirror query");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(|e| self.sql_err(e))?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok(JobRecord {
                    job_type: r.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    instance: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    run_time: r.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                    timestamp: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    metrics: r.get(4)?,
                })
            })
            .map_err(|e| self.sql_err(e))?;

        let mut out = vec![];
        for row in rows {
            out.push(row.map_err(|e| self.sql_err(e))?);
        }
        Ok(out)
    }

    fn count(&self) -> MirrorResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(1) FROM job_times", [], |r| r.get(0))
            .map_err(|e| self.sql_err(e))?;
        Ok(n as u64)
    }
}
