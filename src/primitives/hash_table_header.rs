//! # Hash Table Header
//!
//! The bucket array of an open-bucket hash table: a 4-byte bucket count
//! followed by `buckets` link values, each holding the position of the
//! first slab or record of its collision chain, or the all-ones empty
//! sentinel. Key-to-bucket mapping is the key's leading bytes modulo the
//! bucket count; keys here are digests, so no extra mixing is needed.
//!
//! The persisted bucket count is validated at `start()` - a mismatch means
//! the store was created with different settings and must not be opened.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::{ensure, Result};

use crate::memory::MappedFile;

use super::{ArrayIndex, FileOffset, Link, TableKey};

const BUCKET_COUNT_SIZE: u64 = 4;

/// Bucket array holding links of type `V` (slab positions or row indexes).
pub struct HashTableHeader<V: Link> {
    file: Arc<MappedFile>,
    offset: u64,
    buckets: u64,
    _marker: PhantomData<V>,
}

impl<V: Link> HashTableHeader<V> {
    pub fn new(file: Arc<MappedFile>, offset: u64, buckets: u64) -> Self {
        debug_assert!(buckets > 0, "hash table needs at least one bucket");
        Self {
            file,
            offset,
            buckets,
            _marker: PhantomData,
        }
    }

    /// Total bytes occupied by the bucket count and the bucket array.
    pub fn size(&self) -> u64 {
        BUCKET_COUNT_SIZE + self.buckets * V::BYTES as u64
    }

    /// End offset of this header within its file; the space manager that
    /// shares the file starts here.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size()
    }

    /// First-run initialization: write the bucket count and set every
    /// bucket to the empty sentinel.
    pub fn create(&self) -> Result<()> {
        self.file.resize(self.end_offset())?;

        let memory = self.file.access()?;
        memory.write(self.offset, &(self.buckets as ArrayIndex).to_le_bytes());

        // Sentinel-fill in bounded chunks to keep the scratch buffer small.
        let fill = [0xFFu8; 64 * 1024];
        let mut remaining = self.buckets * V::BYTES as u64;
        let mut at = self.offset + BUCKET_COUNT_SIZE;
        while remaining > 0 {
            let chunk = remaining.min(fill.len() as u64) as usize;
            memory.write(at, &fill[..chunk]);
            at += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Validate the persisted bucket count against this header's settings.
    pub fn start(&self) -> Result<()> {
        let memory = self.file.access()?;
        let bytes = memory.slice(self.offset, BUCKET_COUNT_SIZE as usize);
        let stored = ArrayIndex::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;

        ensure!(
            stored == self.buckets,
            "bucket count mismatch in '{}': stored {}, configured {}",
            self.file.path().display(),
            stored,
            self.buckets
        );
        Ok(())
    }

    pub fn bucket_index<K: TableKey>(&self, key: &K) -> u64 {
        key.bucket_seed() % self.buckets
    }

    pub fn read(&self, bucket: u64) -> Result<V> {
        let memory = self.file.access()?;
        Ok(V::read_from(
            memory.slice(self.bucket_offset(bucket), V::BYTES),
        ))
    }

    pub fn write(&self, bucket: u64, value: V) -> Result<()> {
        let mut raw = [0u8; 8];
        value.write_to(&mut raw);

        let memory = self.file.access()?;
        memory.write(self.bucket_offset(bucket), &raw[..V::BYTES]);
        Ok(())
    }

    fn bucket_offset(&self, bucket: u64) -> FileOffset {
        debug_assert!(bucket < self.buckets, "bucket index out of range");
        self.offset + BUCKET_COUNT_SIZE + bucket * V::BYTES as u64
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
    fn create_fills_buckets_with_sentinel() {
        let dir = tempdir().unwrap();
        let header: HashTableHeader<u64> =
            HashTableHeader::new(open_file(dir.path(), "buckets"), 0, 101);

        header.create().unwrap();

        for bucket in [0, 50, 100] {
            assert_eq!(header.read(bucket).unwrap(), u64::MAX);
        }
    }

    #[test]
    fn write_then_read_bucket() {
        let dir = tempdir().unwrap();
        let header: HashTableHeader<u32> =
            HashTableHeader::new(open_file(dir.path(), "buckets"), 16, 7);

        header.create().unwrap();
        header.write(3, 42).unwrap();

        assert_eq!(header.read(3).unwrap(), 42);
        assert_eq!(header.read(2).unwrap(), u32::MAX);
    }

    #[test]
    fn start_rejects_mismatched_bucket_count() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path(), "buckets");

        let header: HashTableHeader<u64> = HashTableHeader::new(file.clone(), 0, 11);
        header.create().unwrap();

        let reopened: HashTableHeader<u64> = HashTableHeader::new(file, 0, 13);
        assert!(reopened.start().is_err());
    }

    #[test]
    fn bucket_index_is_stable_modulo() {
        let dir = tempdir().unwrap();
        let header: HashTableHeader<u64> =
            HashTableHeader::new(open_file(dir.path(), "buckets"), 0, 13);

        let key = [0xABu8; 32];
        assert_eq!(header.bucket_index(&key), key.bucket_seed() % 13);
    }
}
