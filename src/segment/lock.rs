//! Advisory file lock around manifest updates.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

const LOCK_FILE: &str = "index.lock";

/// Exclusive lock on an index directory, released on drop.
///
/// Serializes publishes between processes sharing one index directory.
/// Within a process the index's own mutex does the same job.
pub struct IndexLockGuard {
    file: File,
}

impl IndexLockGuard {
    /// Block until the lock is acquired
    pub fn acquire(index_dir: &Path) -> io::Result<Self> {
        let file = open_lock_file(index_dir)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// `Ok(None)` when another holder has the lock
    pub fn try_acquire(index_dir: &Path) -> io::Result<Option<Self>> {
        let file = open_lock_file(index_dir)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn open_lock_file(index_dir: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(index_dir.join(LOCK_FILE))
}

impl Drop for IndexLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let guard = IndexLockGuard::acquire(dir.path()).unwrap();
        assert!(IndexLockGuard::try_acquire(dir.path()).unwrap().is_none());
        drop(guard);
        assert!(IndexLockGuard::try_acquire(dir.path()).unwrap().is_some());
    }
}
