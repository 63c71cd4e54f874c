//! # Process Lock
//!
//! Interprocess exclusivity for the whole store directory: one lock file,
//! held exclusively for the lifetime of the started store. A second
//! process trying to start on the same directory fails fast at `start()` -
//! this is the mechanism preventing two nodes from sharing a data
//! directory, and it is fatal, reported, and never retried.
//!
//! The file is removed again on orderly `stop()`, so its presence at the
//! next start is a sentinel for a hard shutdown (logged, not fatal - the
//! mapped files are flushed by the OS page cache either way).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use fs2::FileExt;
use parking_lot::Mutex;
use tracing::warn;

pub struct ProcessLock {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ProcessLock {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    /// Acquire exclusive ownership of the store directory.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.file.lock();
        if slot.is_some() {
            return Ok(());
        }

        if self.path.exists() {
            warn!(
                lock = %self.path.display(),
                "lock file present at startup; previous shutdown was not orderly"
            );
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .wrap_err_with(|| format!("failed to open lock file '{}'", self.path.display()))?;

        file.try_lock_exclusive().wrap_err_with(|| {
            format!(
                "store directory is locked by another process ('{}')",
                self.path.display()
            )
        })?;

        *slot = Some(file);
        Ok(())
    }

    /// Release the lock and remove the file as a clean-shutdown sentinel.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.file.lock();
        if let Some(file) = slot.take() {
            FileExt::unlock(&file)
                .wrap_err_with(|| format!("failed to unlock '{}'", self.path.display()))?;
            drop(file);
            std::fs::remove_file(&self.path)
                .wrap_err_with(|| format!("failed to remove '{}'", self.path.display()))?;
        }
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.file.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn start_then_stop_removes_sentinel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("process_lock");

        let lock = ProcessLock::new(&path);
        lock.start().unwrap();
        assert!(lock.is_held());
        assert!(path.exists());

        lock.stop().unwrap();
        assert!(!lock.is_held());
        assert!(!path.exists());
    }

    #[test]
    fn second_holder_fails_fast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("process_lock");

        let first = ProcessLock::new(&path);
        first.start().unwrap();

        // Same-process relock through an independent handle mirrors what a
        // second node process would hit.
        let second = ProcessLock::new(&path);
        assert!(second.start().is_err());

        first.stop().unwrap();
    }
}
