//! # Record List
//!
//! Intrusive singly-linked lists of fixed-size rows, all living in one
//! [`RecordManager`]. Each row embeds the index of its successor:
//!
//! ```text
//! [ next: 4  ]   index of the following row, or the empty sentinel
//! [ value    ]   exactly `value_size` bytes
//! ```
//!
//! The multimap stores one such list per key, prepending rows at the head.
//! Rows are never relocated; deleting a head row only repoints the key's
//! head link, leaving the row bytes orphaned.

use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

use crate::memory::MappedFile;

use super::{ArrayIndex, FileOffset, Link, RecordManager};

const LINK_SIZE: usize = 4;

pub struct RecordList {
    manager: RecordManager,
    value_size: usize,
}

impl RecordList {
    pub fn new(file: Arc<MappedFile>, offset: u64, value_size: usize) -> Self {
        Self {
            manager: RecordManager::new(file, offset, LINK_SIZE + value_size),
            value_size,
        }
    }

    pub fn create(&self) -> Result<()> {
        self.manager.create()
    }

    pub fn start(&self) -> Result<()> {
        self.manager.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.manager.sync()
    }

    pub fn file(&self) -> &Arc<MappedFile> {
        self.manager.file()
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Append a row pointing at `next`, with its value serialized by
    /// `write`. Returns the new row's index.
    pub fn insert(
        &self,
        next: ArrayIndex,
        write: impl FnOnce(&mut [u8]),
    ) -> Result<ArrayIndex> {
        let index = self.manager.new_records(1)?;

        let mut row: SmallVec<[u8; 256]> = SmallVec::from_elem(0, LINK_SIZE + self.value_size);
        next.write_to(&mut row[..LINK_SIZE]);
        write(&mut row[LINK_SIZE..]);

        let memory = self.manager.file().access()?;
        memory.write(self.manager.record_offset(index), &row);
        Ok(index)
    }

    /// Successor of `index`, or the empty sentinel at the end of a list.
    pub fn next(&self, index: ArrayIndex) -> Result<ArrayIndex> {
        let memory = self.manager.file().access()?;
        Ok(ArrayIndex::read_from(
            memory.slice(self.manager.record_offset(index), LINK_SIZE),
        ))
    }

    /// Absolute offset of a row's value bytes.
    pub fn value_offset(&self, index: ArrayIndex) -> FileOffset {
        self.manager.record_offset(index) + LINK_SIZE as u64
    }

    /// Copy a row's value out of the mapping.
    pub fn read_value(&self, index: ArrayIndex) -> Result<SmallVec<[u8; 256]>> {
        let memory = self.manager.file().access()?;
        Ok(SmallVec::from_slice(
            memory.slice(self.value_offset(index), self.value_size),
        ))
    }
}
