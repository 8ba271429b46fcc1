//! Exclusive lock over a destination directory

use crate::{CrawlError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock file inside a destination directory
pub const LOCK_FILE_NAME: &str = ".lock";

/// Held for as long as a crawler owns a destination directory
///
/// The lock is an advisory `flock` on `.lock`. The file is removed by
/// `release`; after a crash it stays behind unlocked and is reused.
#[derive(Debug)]
pub struct DirectoryLock {
    path: PathBuf,
    file: Option<File>,
}

impl DirectoryLock {
    /// Creates the directory if needed and locks it
    ///
    /// # Returns
    ///
    /// * `Ok(DirectoryLock)` - This process now owns the directory
    /// * `Err(CrawlError::DirectoryLocked)` - Another owner holds the lock
    pub fn acquire(directory: &Path) -> Result<Self> {
        fs::create_dir_all(directory)?;
        let path = directory.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(CrawlError::DirectoryLocked {
                path: directory.display().to_string(),
            });
        }

        tracing::debug!("Locked {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Unlocks and deletes the lock file
    pub fn release(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.unlock()?;
            drop(file);
            fs::remove_file(&self.path)?;
            tracing::debug!("Released {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
