//! Cross-process advisory lock over the store.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::errors::StoreError;

/// Exclusive lock on `store.lock`, held for the lifetime of the guard.
///
/// Every mutating store operation takes this lock, so run-id allocation,
/// the current pointer and commits are serialized across processes.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Block until the lock is acquired.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::io("open lock file", path, e))?;

        FileExt::lock_exclusive(&file).map_err(|e| StoreError::io("lock store", path, e))?;
        trace!(path = %path.display(), "store lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well.
        let _ = FileExt::unlock(&self.file);
        trace!(path = %self.path.display(), "store lock released");
    }
}
