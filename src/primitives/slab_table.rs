//! # Slab Hash Table
//!
//! Hash table mapping a fixed-size key to one variable-length value,
//! combining a [`HashTableHeader`] (buckets) with a [`SlabManager`]
//! (values). Each slab embeds its own collision link:
//!
//! ```text
//! [ key: K::LEN ]
//! [ next: 8     ]   position of the next slab in this bucket's chain
//! [ value ...   ]
//! ```
//!
//! `store` links the new slab as the bucket head, so duplicate keys form a
//! chain and `find` returns the most recently stored match. Uniqueness is
//! a caller responsibility where the table's contract requires it; the
//! registry tables enforce it by content comparison before storing.
//!
//! A slab write happens before the bucket head is republished, so a torn
//! store can orphan a slab but never corrupt a chain.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

use crate::memory::MappedFile;

use super::{FileOffset, HashTableHeader, Link, SlabManager, TableKey};

const LINK_SIZE: usize = 8;

pub struct SlabTable<K: TableKey> {
    header: HashTableHeader<FileOffset>,
    manager: SlabManager,
    _marker: PhantomData<K>,
}

impl<K: TableKey> SlabTable<K> {
    /// Lay the table out in `file` starting at `offset`: bucket array
    /// first, slab payload after it.
    pub fn new(file: Arc<MappedFile>, offset: u64, buckets: u64) -> Self {
        let header = HashTableHeader::new(file.clone(), offset, buckets);
        let manager = SlabManager::new(file, header.end_offset());
        Self {
            header,
            manager,
            _marker: PhantomData,
        }
    }

    pub fn create(&self) -> Result<()> {
        self.header.create()?;
        self.manager.create()
    }

    pub fn start(&self) -> Result<()> {
        self.header.start()?;
        self.manager.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.manager.sync()
    }

    /// Store a value of exactly `value_size` bytes, serialized by `write`.
    /// Returns the new slab's position.
    pub fn store(
        &self,
        key: &K,
        value_size: usize,
        write: impl FnOnce(&mut [u8]),
    ) -> Result<FileOffset> {
        let bucket = self.header.bucket_index(key);
        let slab_size = K::LEN + LINK_SIZE + value_size;
        let position = self.manager.new_slab(slab_size)?;
        let old_head = self.header.read(bucket)?;

        let mut slab: SmallVec<[u8; 512]> = SmallVec::from_elem(0, slab_size);
        key.write_to(&mut slab[..K::LEN]);
        old_head.write_to(&mut slab[K::LEN..]);
        write(&mut slab[K::LEN + LINK_SIZE..]);

        {
            let memory = self.manager.file().access()?;
            memory.write(self.manager.slab_offset(position), &slab);
        }

        // Publish last: the chain stays intact if the process dies between
        // the slab write and this bucket update.
        self.header.write(bucket, position)?;
        Ok(position)
    }

    /// Absolute offset of the value of the first slab matching `key`, or
    /// `None`. The value's length is encoded in the value itself.
    pub fn find(&self, key: &K) -> Result<Option<FileOffset>> {
        Ok(self
            .locate(key)?
            .map(|(position, _)| self.value_offset(position)))
    }

    /// Remove the first slab matching `key` from its chain. The slab bytes
    /// stay behind as an orphan; physical reclamation is out of scope.
    pub fn unlink(&self, key: &K) -> Result<bool> {
        let bucket = self.header.bucket_index(key);
        let Some((position, previous)) = self.locate(key)? else {
            return Ok(false);
        };

        let next = {
            let memory = self.manager.file().access()?;
            let offset = self.manager.slab_offset(position);
            FileOffset::read_from(memory.slice(offset + K::LEN as u64, LINK_SIZE))
        };

        match previous {
            Some(previous) => {
                let memory = self.manager.file().access()?;
                let mut raw = [0u8; LINK_SIZE];
                next.write_to(&mut raw);
                memory.write(self.manager.slab_offset(previous) + K::LEN as u64, &raw);
            }
            None => self.header.write(bucket, next)?,
        }
        Ok(true)
    }

    /// Absolute offset of a slab's value region.
    pub fn value_offset(&self, position: FileOffset) -> FileOffset {
        self.manager.slab_offset(position) + (K::LEN + LINK_SIZE) as u64
    }

    /// Walk the bucket chain for `key`; returns the matching slab position
    /// and the position of its predecessor in the chain, if any.
    fn locate(&self, key: &K) -> Result<Option<(FileOffset, Option<FileOffset>)>> {
        let bucket = self.header.bucket_index(key);
        let mut current = self.header.read(bucket)?;
        let mut previous = None;

        let memory = self.manager.file().access()?;
        while current != FileOffset::EMPTY {
            let offset = self.manager.slab_offset(current);
            let head = memory.slice(offset, K::LEN + LINK_SIZE);
            if key.matches(head) {
                return Ok(Some((current, previous)));
            }
            previous = Some(current);
            current = FileOffset::read_from(&head[K::LEN..]);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RemapGate;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> SlabTable<[u8; 32]> {
        let path = dir.join("lookup");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"X").unwrap();

        let mapped = Arc::new(MappedFile::new(path, RemapGate::default()));
        mapped.open().unwrap();

        let table = SlabTable::new(mapped, 0, 17);
        table.create().unwrap();
        table
    }

    fn read_value(table: &SlabTable<[u8; 32]>, key: &[u8; 32], len: usize) -> Option<Vec<u8>> {
        let offset = table.find(key).unwrap()?;
        let memory = table.manager.file().access().unwrap();
        Some(memory.slice(offset, len).to_vec())
    }

    #[test]
    fn store_then_find() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let key = [1u8; 32];

        table
            .store(&key, 5, |value| value.copy_from_slice(b"hello"))
            .unwrap();

        assert_eq!(read_value(&table, &key, 5).unwrap(), b"hello");
        assert!(table.find(&[2u8; 32]).unwrap().is_none());
    }

    #[test]
    fn colliding_keys_chain_and_resolve() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        // Equal leading bytes force the same bucket; tails differ.
        let mut first = [9u8; 32];
        let mut second = [9u8; 32];
        first[31] = 1;
        second[31] = 2;

        table.store(&first, 1, |v| v[0] = 0xAA).unwrap();
        table.store(&second, 1, |v| v[0] = 0xBB).unwrap();

        assert_eq!(read_value(&table, &first, 1).unwrap(), [0xAA]);
        assert_eq!(read_value(&table, &second, 1).unwrap(), [0xBB]);
    }

    #[test]
    fn duplicate_key_finds_last_stored() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let key = [3u8; 32];

        table.store(&key, 1, |v| v[0] = 1).unwrap();
        table.store(&key, 1, |v| v[0] = 2).unwrap();

        assert_eq!(read_value(&table, &key, 1).unwrap(), [2]);
    }

    #[test]
    fn unlink_head_and_middle_of_chain() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        let mut keys = Vec::new();
        for tail in 0..3u8 {
            let mut key = [7u8; 32];
            key[31] = tail;
            table.store(&key, 1, |v| v[0] = tail).unwrap();
            keys.push(key);
        }

        // Head of the chain is the most recently stored key.
        assert!(table.unlink(&keys[2]).unwrap());
        assert!(read_value(&table, &keys[2], 1).is_none());
        assert_eq!(read_value(&table, &keys[0], 1).unwrap(), [0]);

        // Middle removal relinks its predecessor.
        assert!(table.unlink(&keys[1]).unwrap());
        assert_eq!(read_value(&table, &keys[0], 1).unwrap(), [0]);

        assert!(!table.unlink(&keys[1]).unwrap());
    }

    #[test]
    fn survives_restart() {
        let dir = tempdir().unwrap();
        let key = [5u8; 32];

        let path = {
            let table = table(dir.path());
            table
                .store(&key, 3, |value| value.copy_from_slice(b"abc"))
                .unwrap();
            table.sync().unwrap();
            table.manager.file().path().to_path_buf()
        };

        let mapped = Arc::new(MappedFile::new(path, RemapGate::default()));
        mapped.open().unwrap();
        let table: SlabTable<[u8; 32]> = SlabTable::new(mapped, 0, 17);
        table.start().unwrap();

        assert_eq!(read_value(&table, &key, 3).unwrap(), b"abc");
    }
}
