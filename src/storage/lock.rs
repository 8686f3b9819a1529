//! Lock file that keeps runs from overlapping.
//!
//! The archive and address book are rewritten whole, so a manual run racing
//! a scheduled one could lose an edition. The guard holds an exclusive
//! advisory lock on the file; the kernel drops it when the process exits,
//! however it exits, so a crashed run never blocks the next one. The file
//! itself stays on disk and only records the pid of the last holder.

use crate::error::LockError;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    // Closing the handle releases the lock
    _file: File,
}

impl RunLock {
    /// Take the exclusive lock on `path`, creating the file if needed.
    ///
    /// # Errors
    ///
    /// [`LockError::Held`] when another live process holds the lock, and
    /// [`LockError::Io`] when the file cannot be opened or written.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_err)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(LockError::Held(path.to_path_buf())),
            Err(TryLockError::Error(source)) => return Err(io_err(source)),
        }
        // The pid only helps whoever wonders who holds the lock
        file.set_len(0).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Run lock released");
    }
}
