//! # Sequential Lock
//!
//! The consistency core: one atomic version counter plus a writer latch.
//! Writers are serialized; readers never block, they validate.
//!
//! The counter is even while the store is quiescent and odd while a write
//! is in flight:
//!
//! - `begin_write` takes the writer latch and bumps the counter to odd
//! - dropping the [`WriteGuard`] bumps it back to even, publishing the
//!   mutation
//! - `begin_read` samples the counter; `is_read_valid` accepts only an
//!   even, unchanged sample
//!
//! A reader overlapping a write in any way - started before, during, or
//! seeing a version bump - fails validation and retries. That gives
//! readers wait-free snapshot isolation against the single writer at the
//! cost of redoing a read on (rare) contention. A failed validation is
//! the designed retry signal, never an error.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// A sampled version; even means no write was in flight at the sample.
pub type ReadHandle = u64;

pub struct SequentialLock {
    version: AtomicU64,
    writer: Mutex<()>,
}

impl Default for SequentialLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialLock {
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Sample the version counter. Never blocks.
    pub fn begin_read(&self) -> ReadHandle {
        self.version.load(Ordering::Acquire)
    }

    /// Whether a read that started at `handle` observed no interleaved
    /// write: the sample was even and is unchanged now.
    pub fn is_read_valid(&self, handle: ReadHandle) -> bool {
        !Self::is_write_locked(handle) && self.version.load(Ordering::Acquire) == handle
    }

    /// Whether `handle` was sampled while a write was in flight.
    pub fn is_write_locked(handle: ReadHandle) -> bool {
        handle % 2 == 1
    }

    /// Enter the single-writer critical section, blocking until any other
    /// writer finishes. Dropping the guard publishes the write.
    pub fn begin_write(&self) -> WriteGuard<'_> {
        let latch = self.writer.lock();
        self.version.fetch_add(1, Ordering::AcqRel);
        WriteGuard { lock: self, _latch: latch }
    }

    /// Run `read` until it completes without an interleaved write.
    pub fn read_consistent<T>(&self, mut read: impl FnMut() -> T) -> T {
        loop {
            let handle = self.begin_read();
            if Self::is_write_locked(handle) {
                std::thread::yield_now();
                continue;
            }
            let value = read();
            if self.is_read_valid(handle) {
                return value;
            }
        }
    }
}

/// Holds the writer latch; dropping it increments the version back to
/// even, making the whole critical section visible to readers at once.
pub struct WriteGuard<'a> {
    lock: &'a SequentialLock,
    _latch: MutexGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.version.fetch_add(1, Ordering::AcqRel);
    }
}
