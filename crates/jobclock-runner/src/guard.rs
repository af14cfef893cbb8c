use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("sync already running (pid {pid}, since unix {acquired_at_unix}); lock {}", .path.display())]
    Held {
        path: PathBuf,
        pid: u32,
        acquired_at_unix: i64,
    },
    #[error("sync lock io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct LockBody {
    token: String,
    pid: u32,
    acquired_at_unix: i64,
}

/// Single-flight guard for one sync job, held as an exclusively-created lock file.
///
/// Released on drop, which covers early returns, errors and unwinding. A lock older than the
/// TTL belongs to a process that died without dropping it and is taken over.
#[derive(Debug)]
pub struct SyncGuard {
    path: PathBuf,
    token: String,
}

impl SyncGuard {
    /// Identity of a sync job: the same source feeding the same mirror.
    pub fn sync_key(endpoint: &str, index: &str, mirror_path: &Path) -> String {
        let mut h = Sha256::new();
        h.update(endpoint.as_bytes());
        h.update([0u8]);
        h.update(index.as_bytes());
        h.update([0u8]);
        h.update(mirror_path.to_string_lossy().as_bytes());
        hex::encode(h.finalize())[..16].to_string()
    }

    /// The lock lives next to the mirror file.
    pub fn lock_path(mirror_path: &Path, key: &str) -> PathBuf {
        let dir = mirror_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        dir.join(format!(".jobclock-sync-{key}.lock"))
    }

    /// Creates the lock's directory when missing, so a first sync into a fresh location works.
    pub fn try_acquire(path: &Path, ttl: Duration) -> Result<Self, GuardError> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| GuardError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        match Self::create(path) {
            Ok(guard) => Ok(guard),
            Err(GuardError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                let holder = read_body(path);
                if !is_stale(path, holder.as_ref(), ttl) {
                    return Err(held(path, holder));
                }
                Self::take_over(path, ttl)
            }
            Err(e) => Err(e),
        }
    }

    /// Move the stale lock aside with an atomic rename, then confirm what was moved is still
    /// stale. Another process may have replaced it between the staleness check and the rename;
    /// in that case its lock is put back and we report it as held.
    fn take_over(path: &Path, ttl: Duration) -> Result<Self, GuardError> {
        let io = |source| GuardError::Io {
            path: path.to_path_buf(),
            source,
        };
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let aside = path.with_file_name(format!("{name}.stale-{}", Uuid::new_v4()));

        match std::fs::rename(path, &aside) {
            Ok(()) => {
                let moved = read_body(&aside);
                if !is_stale(&aside, moved.as_ref(), ttl) {
                    if let Err(e) = std::fs::hard_link(&aside, path) {
                        warn!(lock = %path.display(), error = %e, "could not restore a live sync lock");
                    }
                    std::fs::remove_file(&aside).map_err(io)?;
                    return Err(held(path, moved));
                }
                warn!(lock = %path.display(), "taking over stale sync lock");
                std::fs::remove_file(&aside).map_err(io)?;
            }
            // someone else already moved it
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io(e)),
        }

        match Self::create(path) {
            Err(GuardError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                Err(held(path, read_body(path)))
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self, GuardError> {
        let io = |source| GuardError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut f = OpenOptions::new().write(true).create_new(true).open(path).map_err(io)?;
        let body = LockBody {
            token: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at_unix: jobclock_core::now_unix(),
        };
        let bytes = serde_json::to_vec(&body).map_err(|e| io(e.into()))?;
        f.write_all(&bytes).map_err(io)?;
        debug!(lock = %path.display(), token = %body.token, "sync lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            token: body.token,
        })
    }

}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        // never delete a lock someone else took over
        match read_body(&self.path) {
            Some(body) if body.token == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(lock = %self.path.display(), error = %e, "failed to release sync lock");
                }
            }
            _ => warn!(lock = %self.path.display(), "sync lock no longer ours; leaving it"),
        }
    }
}

fn held(path: &Path, holder: Option<LockBody>) -> GuardError {
    let (pid, acquired_at_unix) = holder.map(|b| (b.pid, b.acquired_at_unix)).unwrap_or((0, 0));
    GuardError::Held {
        path: path.to_path_buf(),
        pid,
        acquired_at_unix,
    }
}

fn read_body(path: &Path) -> Option<LockBody> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn is_stale(path: &Path, holder: Option<&LockBody>, ttl: Duration) -> bool {
    let age_secs = match holder {
        Some(b) => jobclock_core::now_unix().saturating_sub(b.acquired_at_unix),
        // unreadable body: maybe mid-write, judge by mtime instead
        None => std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| SystemTime::now().duration_since(t).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
    };
    age_secs > ttl.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let g = SyncGuard::try_acquire(&path, HOUR).unwrap();
        let err = SyncGuard::try_acquire(&path, HOUR).unwrap_err();
        assert!(matches!(err, GuardError::Held { pid, .. } if pid == std::process::id()));
        drop(g);
        assert!(!path.exists());
        let _again = SyncGuard::try_acquire(&path, HOUR).unwrap();
    }

    #[test]
    fn released_on_error_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let work = || -> Result<(), String> {
            let _g = SyncGuard::try_acquire(&path, HOUR).map_err(|e| e.to_string())?;
            Err("fetch blew up".to_string())
        };
        assert!(work().is_err());
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let old = LockBody {
            token: "dead".into(),
            pid: 1,
            acquired_at_unix: jobclock_core::now_unix() - 7200,
        };
        std::fs::write(&path, serde_json::to_vec(&old).unwrap()).unwrap();
        let g = SyncGuard::try_acquire(&path, HOUR).unwrap();
        assert_eq!(read_body(&path).unwrap().token, g.token);
    }

    #[test]
    fn stale_takeover_leaves_nothing_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let old = LockBody {
            token: "dead".into(),
            pid: 1,
            acquired_at_unix: jobclock_core::now_unix() - 7200,
        };
        std::fs::write(&path, serde_json::to_vec(&old).unwrap()).unwrap();
        let g = SyncGuard::try_acquire(&path, HOUR).unwrap();
        drop(g);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn takeover_backs_off_when_lock_was_refreshed() {
        // another process replaced the stale lock after our staleness check
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let fresh = SyncGuard::try_acquire(&path, HOUR).unwrap();

        let err = SyncGuard::take_over(&path, HOUR).unwrap_err();
        assert!(matches!(err, GuardError::Held { pid, .. } if pid == std::process::id()));
        assert_eq!(read_body(&path).unwrap().token, fresh.token);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn creates_missing_lock_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("sync.lock");
        let g = SyncGuard::try_acquire(&path, HOUR).unwrap();
        assert!(path.exists());
        drop(g);
        assert!(!path.exists());
    }

    #[test]
    fn does_not_remove_a_foreign_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        let g = SyncGuard::try_acquire(&path, HOUR).unwrap();
        let other = LockBody {
            token: "someone-else".into(),
            pid: 2,
            acquired_at_unix: jobclock_core::now_unix(),
        };
        std::fs::write(&path, serde_json::to_vec(&other).unwrap()).unwrap();
        drop(g);
        assert!(path.exists());
    }

    #[test]
    fn key_and_path_are_stable() {
        let a = SyncGuard::sync_key("http://es", "_search", Path::new("job.db"));
        let b = SyncGuard::sync_key("http://es", "_search", Path::new("job.db"));
        let c = SyncGuard::sync_key("http://es", "_search", Path::new("other.db"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert_eq!(SyncGuard::lock_path(Path::new("job.db"), &a), Path::new(".").join(format!(".jobclock-sync-{a}.lock")));
        assert_eq!(
            SyncGuard::lock_path(Path::new("/var/lib/jc/job.db"), "k"),
            Path::new("/var/lib/jc/.jobclock-sync-k.lock")
        );
    }
}
