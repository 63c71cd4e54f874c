//! # Spend Table
//!
//! Record hash table keyed by the spent previous output point. The value
//! is the spending input point plus a checksum of the spent point, used to
//! cross-validate a spend against its unspent row without re-reading the
//! output:
//!
//! ```text
//! [ spender:36  ]   input point consuming the previous output
//! [ checksum:8  ]   CRC-64 of the previous output point
//! ```

use std::sync::Arc;

use eyre::Result;

use crate::chain::{OutPoint, POINT_SIZE};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::RecordTable;

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

const VALUE_SIZE: usize = POINT_SIZE + 8;

pub struct SpendTable {
    file: Arc<MappedFile>,
    header: StoreFileHeader,
    lookup: RecordTable<OutPoint>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SpendRow {
    pub spender: OutPoint,
    pub checksum: u64,
}

impl SpendTable {
    pub fn new(path: &std::path::Path, gate: RemapGate, buckets: u64) -> Self {
        let file = Arc::new(MappedFile::new(path, gate));
        let lookup = RecordTable::new(file.clone(), FILE_HEADER_SIZE as u64, buckets, VALUE_SIZE);
        Self {
            file,
            header: StoreFileHeader::new(FileKind::Lookup, buckets, VALUE_SIZE as u32),
            lookup,
        }
    }

    pub fn create(&self) -> Result<()> {
        self.file.open()?;
        write_header(&self.file, &self.header)?;
        self.lookup.create()
    }

    pub fn start(&self) -> Result<()> {
        self.file.open()?;
        check_header(&self.file, &self.header)?;
        self.lookup.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.file.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.file.close()
    }

    pub fn sync(&self) -> Result<()> {
        self.lookup.sync()
    }

    pub fn store(&self, previous: &OutPoint, spender: &OutPoint) -> Result<()> {
        let checksum = previous.checksum();
        self.lookup
            .store(previous, |value| {
                let mut writer = Writer::new(value);
                spender.encode(&mut writer);
                writer.put_u64(checksum);
            })
            .map(|_| ())
    }

    pub fn get(&self, previous: &OutPoint) -> Result<Option<SpendRow>> {
        let Some(offset) = self.lookup.find(previous)? else {
            return Ok(None);
        };

        let memory = self.file.access()?;
        let mut reader = Reader::new(memory.slice(offset, VALUE_SIZE));
        Ok(Some(SpendRow {
            spender: OutPoint::decode(&mut reader)?,
            checksum: reader.get_u64()?,
        }))
    }

    pub fn remove(&self, previous: &OutPoint) -> Result<bool> {
        self.lookup.unlink(previous)
    }
}
