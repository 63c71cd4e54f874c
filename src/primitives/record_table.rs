//! # Record Hash Table
//!
//! Hash table mapping a fixed-size key to one fixed-size value, combining a
//! [`HashTableHeader`] (buckets, `u32` links) with a [`RecordManager`]
//! (rows). Record layout:
//!
//! ```text
//! [ key: K::LEN ]
//! [ next: 4     ]   index of the next record in this bucket's chain
//! [ value       ]   exactly `value_size` bytes
//! ```
//!
//! Same chaining contract as the slab table, plus `update` - an in-place
//! value rewrite for an existing key, which the multimap uses to repoint a
//! key's row-list head and the registry tables use for content refresh.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

use crate::memory::MappedFile;

use super::{ArrayIndex, FileOffset, HashTableHeader, Link, RecordManager, TableKey};

const LINK_SIZE: usize = 4;

pub struct RecordTable<K: TableKey> {
    header: HashTableHeader<ArrayIndex>,
    manager: RecordManager,
    value_size: usize,
    _marker: PhantomData<K>,
}

impl<K: TableKey> RecordTable<K> {
    /// Lay the table out in `file` starting at `offset`: bucket array
    /// first, record payload after it.
    pub fn new(file: Arc<MappedFile>, offset: u64, buckets: u64, value_size: usize) -> Self {
        let header = HashTableHeader::new(file.clone(), offset, buckets);
        let record_size = K::LEN + LINK_SIZE + value_size;
        let manager = RecordManager::new(file, header.end_offset(), record_size);
        Self {
            header,
            manager,
            value_size,
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

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    pub fn file(&self) -> &Arc<MappedFile> {
        self.manager.file()
    }

    /// Store a value serialized by `write`, linking it as the bucket head.
    pub fn store(&self, key: &K, write: impl FnOnce(&mut [u8])) -> Result<ArrayIndex> {
        let bucket = self.header.bucket_index(key);
        let index = self.manager.new_records(1)?;
        let old_head = self.header.read(bucket)?;

        let record_size = K::LEN + LINK_SIZE + self.value_size;
        let mut record: SmallVec<[u8; 256]> = SmallVec::from_elem(0, record_size);
        key.write_to(&mut record[..K::LEN]);
        old_head.write_to(&mut record[K::LEN..]);
        write(&mut record[K::LEN + LINK_SIZE..]);

        {
            let memory = self.manager.file().access()?;
            memory.write(self.manager.record_offset(index), &record);
        }

        self.header.write(bucket, index)?;
        Ok(index)
    }

    /// Absolute offset of the value of the first record matching `key`.
    pub fn find(&self, key: &K) -> Result<Option<FileOffset>> {
        Ok(self.locate(key)?.map(|(index, _)| self.value_offset(index)))
    }

    /// Rewrite the value of an existing key in place. Returns `false` when
    /// the key is absent.
    pub fn update(&self, key: &K, write: impl FnOnce(&mut [u8])) -> Result<bool> {
        let Some((index, _)) = self.locate(key)? else {
            return Ok(false);
        };

        let mut value: SmallVec<[u8; 256]> = SmallVec::from_elem(0, self.value_size);
        write(&mut value);

        let memory = self.manager.file().access()?;
        memory.write(self.value_offset(index), &value);
        Ok(true)
    }

    /// Remove the first record matching `key` from its chain.
    pub fn unlink(&self, key: &K) -> Result<bool> {
        let bucket = self.header.bucket_index(key);
        let Some((index, previous)) = self.locate(key)? else {
            return Ok(false);
        };

        let next = {
            let memory = self.manager.file().access()?;
            let offset = self.manager.record_offset(index);
            ArrayIndex::read_from(memory.slice(offset + K::LEN as u64, LINK_SIZE))
        };

        match previous {
            Some(previous) => {
                let memory = self.manager.file().access()?;
                let mut raw = [0u8; LINK_SIZE];
                next.write_to(&mut raw);
                memory.write(
                    self.manager.record_offset(previous) + K::LEN as u64,
                    &raw,
                );
            }
            None => self.header.write(bucket, next)?,
        }
        Ok(true)
    }

    fn value_offset(&self, index: ArrayIndex) -> FileOffset {
        self.manager.record_offset(index) + (K::LEN + LINK_SIZE) as u64
    }

    fn locate(&self, key: &K) -> Result<Option<(ArrayIndex, Option<ArrayIndex>)>> {
        let bucket = self.header.bucket_index(key);
        let mut current = self.header.read(bucket)?;
        let mut previous = None;

        let memory = self.manager.file().access()?;
        while current != ArrayIndex::EMPTY {
            let offset = self.manager.record_offset(current);
            let head = memory.slice(offset, K::LEN + LINK_SIZE);
            if key.matches(head) {
                return Ok(Some((current, previous)));
            }
            previous = Some(current);
            current = ArrayIndex::read_from(&head[K::LEN..]);
        }
        Ok(None)
    }
}
