//! # Record Manager
//!
//! Space manager for fixed-size elements living after a header region of a
//! mapped file. The record count is persisted in 4 bytes at `header_size`;
//! records follow contiguously. Records are allocated by append and never
//! individually freed - rollback truncates the count, and gaps inside the
//! live range are represented by sentinel values, not by removal.
//!
//! File region:
//!
//! ```text
//! [ 0 .. header_size )                caller's header (file header, buckets)
//! [ header_size .. +4 )               record count, little-endian
//! [ header_size + 4 .. )              records, `record_size` bytes each
//! ```

use std::sync::Arc;

use eyre::{ensure, Result};
use parking_lot::Mutex;

use crate::memory::MappedFile;

use super::{ArrayIndex, FileOffset, RECORD_COUNT_SIZE};

pub struct RecordManager {
    file: Arc<MappedFile>,
    header_size: u64,
    record_size: usize,
    count: Mutex<ArrayIndex>,
}

impl RecordManager {
    pub fn new(file: Arc<MappedFile>, header_size: u64, record_size: usize) -> Self {
        Self {
            file,
            header_size,
            record_size,
            count: Mutex::new(0),
        }
    }

    pub fn file(&self) -> &Arc<MappedFile> {
        &self.file
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// First-run initialization: zero records, count prefix written out.
    pub fn create(&self) -> Result<()> {
        let mut count = self.count.lock();
        *count = 0;
        self.file.resize(self.header_size + RECORD_COUNT_SIZE)?;
        self.write_count(*count)
    }

    /// Read the persisted count and sanity-check it against the file size.
    pub fn start(&self) -> Result<()> {
        let mut count = self.count.lock();

        let memory = self.file.access()?;
        let bytes = memory.slice(self.header_size, RECORD_COUNT_SIZE as usize);
        *count = ArrayIndex::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        let minimum =
            self.header_size + RECORD_COUNT_SIZE + *count as u64 * self.record_size as u64;
        ensure!(
            minimum <= memory.len() as u64,
            "record region of '{}' exceeds file size: {} records of {} bytes",
            self.file.path().display(),
            *count,
            self.record_size
        );
        Ok(())
    }

    /// Persist the in-memory count.
    pub fn sync(&self) -> Result<()> {
        self.write_count(*self.count.lock())
    }

    pub fn count(&self) -> ArrayIndex {
        *self.count.lock()
    }

    /// Roll the element count back; used by reorganization to truncate a
    /// dense index. Records past the new count become dead bytes.
    pub fn set_count(&self, new_count: ArrayIndex) {
        let mut count = self.count.lock();
        debug_assert!(new_count <= *count, "set_count may only truncate");
        *count = new_count;
    }

    /// Append `added` records, growing the file; returns the first new index.
    pub fn new_records(&self, added: ArrayIndex) -> Result<ArrayIndex> {
        let mut count = self.count.lock();
        let first = *count;
        *count += added;

        let required =
            self.header_size + RECORD_COUNT_SIZE + *count as u64 * self.record_size as u64;
        self.file.resize(required)?;
        Ok(first)
    }

    /// Absolute byte offset of a record. The index must be below `count`.
    pub fn record_offset(&self, index: ArrayIndex) -> FileOffset {
        debug_assert!(index < self.count(), "record index past allocated count");
        self.header_size + RECORD_COUNT_SIZE + index as u64 * self.record_size as u64
    }

    fn write_count(&self, count: ArrayIndex) -> Result<()> {
        let memory = self.file.access()?;
        memory.write(self.header_size, &count.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RemapGate;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn open_file(dir: &std::path::Path, name: &str) -> Arc<MappedFile> {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"X").unwrap();

        let mapped = Arc::new(MappedFile::new(path, RemapGate::default()));
        mapped.open().unwrap();
        mapped
    }

    #[test]
    fn create_then_allocate() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(open_file(dir.path(), "records"), 0, 16);

        manager.create().unwrap();
        assert_eq!(manager.count(), 0);

        let first = manager.new_records(3).unwrap();
        assert_eq!(first, 0);
        assert_eq!(manager.count(), 3);
        assert_eq!(manager.record_offset(2), RECORD_COUNT_SIZE + 32);
    }

    #[test]
    fn count_survives_restart() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path(), "records");

        {
            let manager = RecordManager::new(file.clone(), 0, 8);
            manager.create().unwrap();
            manager.new_records(5).unwrap();
            manager.sync().unwrap();
        }

        let manager = RecordManager::new(file, 0, 8);
        manager.start().unwrap();
        assert_eq!(manager.count(), 5);
    }

    #[test]
    fn start_rejects_impossible_count() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path(), "records");

        let manager = RecordManager::new(file.clone(), 0, 64);
        manager.create().unwrap();

        // Forge a count far past the file size.
        file.access().unwrap().write(0, &1_000_000u32.to_le_bytes());

        let reopened = RecordManager::new(file, 0, 64);
        assert!(reopened.start().is_err());
    }

    #[test]
    fn set_count_truncates() {
        let dir = tempdir().unwrap();
        let manager = RecordManager::new(open_file(dir.path(), "records"), 0, 8);

        manager.create().unwrap();
        manager.new_records(4).unwrap();
        manager.set_count(1);

        assert_eq!(manager.count(), 1);
    }
}
