//! Controller mutual exclusion.
//!
//! One advisory-locked PID file per production directory. The lock's only
//! contract is that two controllers for the same production cannot coexist;
//! the recorded PID is informational for operators.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another controller holds the lock at {0}")]
    AlreadyLocked(PathBuf),

    #[error("lockfile error: {0}")]
    Io(#[from] std::io::Error),
}

/// Held for the lifetime of the controller process.
#[derive(Debug)]
pub struct PidLock {
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Take the exclusive lock and record our PID, or fail if a live
    /// controller already holds it.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| LockError::AlreadyLocked(path.to_path_buf()))?;

        let mut lock = Self {
            file,
            path: path.to_path_buf(),
        };
        lock.file.set_len(0)?;
        writeln!(lock.file, "{}", std::process::id())?;
        lock.file.flush()?;
        debug!(path = %lock.path.display(), "controller lock acquired");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prod_a.pid");

        let lock = PidLock::acquire(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());

        let err = PidLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked(_)));

        drop(lock);
        // Released: can be taken again, and the stale file is gone
        assert!(!path.exists());
        let _lock = PidLock::acquire(&path).unwrap();
    }
}
