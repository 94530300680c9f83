//! Process-level mutual exclusion on the state directory.
//!
//! The lock is a JSON file recording the holder's pid and acquire time.
//! A lock whose pid is no longer alive, or whose content cannot be parsed,
//! is treated as stale and taken over.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    at: DateTime<Utc>,
}

/// Scoped guard on the state directory; the lock file is unlinked on drop.
#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
}

impl CycleLock {
    /// Acquire the lock, recovering stale locks from dead processes.
    pub fn acquire(dir: &Path) -> EngineResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("lock");

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                write_lock_info(file)?;
                debug!(path = %path.display(), "lock acquired");
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Self::take_over_if_stale(path)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn take_over_if_stale(path: PathBuf) -> EngineResult<Self> {
        let holder = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockInfo>(raw.trim()).ok());

        if let Some(info) = holder {
            if process_alive(info.pid) {
                return Err(EngineError::LockHeld { pid: info.pid });
            }
            warn!(pid = info.pid, "recovering lock from dead process");
        } else {
            warn!(path = %path.display(), "recovering unparsable lock file");
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        write_lock_info(file)?;
        Ok(Self { path })
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        // Best-effort release.
        let _ = fs::remove_file(&self.path);
    }
}

fn write_lock_info(mut file: fs::File) -> EngineResult<()> {
    let info = LockInfo {
        pid: std::process::id(),
        at: Utc::now(),
    };
    let mut content = serde_json::to_string(&info)?;
    content.push('\n');
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Probe whether a pid refers to a live process without signaling it.
fn process_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_writes_pid_and_releases_on_drop() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("lock");

        {
            let _lock = CycleLock::acquire(dir.path()).unwrap();
            let raw = fs::read_to_string(&lock_path).unwrap();
            assert!(raw.ends_with('\n'));
            let info: LockInfo = serde_json::from_str(raw.trim()).unwrap();
            assert_eq!(info.pid, std::process::id());
        }

        assert!(!lock_path.exists());
    }

    #[test]
    fn held_by_live_process_fails() {
        let dir = tempdir().unwrap();
        let _lock = CycleLock::acquire(dir.path()).unwrap();

        // Our own pid is alive, so a second acquire must fail.
        let err = CycleLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::LockHeld { .. }));
    }

    #[test]
    fn stale_lock_from_dead_pid_is_recovered() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("lock");
        // Pids wrap well below this value on Linux; treat it as dead.
        fs::write(
            &lock_path,
            "{\"pid\": 4194999, \"at\": \"2026-01-01T00:00:00Z\"}\n",
        )
        .unwrap();

        let _lock = CycleLock::acquire(dir.path()).unwrap();
        let info: LockInfo =
            serde_json::from_str(fs::read_to_string(&lock_path).unwrap().trim()).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn unparsable_lock_is_recovered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lock"), "garbage").unwrap();

        assert!(CycleLock::acquire(dir.path()).is_ok());
    }
}
