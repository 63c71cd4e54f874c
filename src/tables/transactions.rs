//! # Transaction Table
//!
//! Slab hash table keyed by transaction hash. Record layout:
//!
//! ```text
//! [ height:4 ]   confirming block height
//! [ index:4  ]   position within that block
//! [ tx ...   ]   full wire encoding
//! ```

use std::sync::Arc;

use eyre::{ensure, Result};

use crate::chain::{Hash256, Transaction};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::SlabTable;

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

pub struct TransactionTable {
    file: Arc<MappedFile>,
    header: StoreFileHeader,
    lookup: SlabTable<Hash256>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransactionResult {
    pub height: u32,
    pub index: u32,
    pub transaction: Transaction,
}

impl TransactionTable {
    pub fn new(path: &std::path::Path, gate: RemapGate, buckets: u64) -> Self {
        let file = Arc::new(MappedFile::new(path, gate));
        let lookup = SlabTable::new(file.clone(), FILE_HEADER_SIZE as u64, buckets);
        Self {
            file,
            header: StoreFileHeader::new(FileKind::Lookup, buckets, 0),
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

    pub fn store(&self, height: u64, index: usize, transaction: &Transaction) -> Result<()> {
        ensure!(height < u32::MAX as u64, "height {} out of range", height);
        ensure!(index <= u32::MAX as usize, "transaction index overflow");

        let value_size = 4 + 4 + transaction.serialized_size();
        self.lookup
            .store(&transaction.hash(), value_size, |value| {
                let mut writer = Writer::new(value);
                writer.put_u32(height as u32);
                writer.put_u32(index as u32);
                transaction.encode(&mut writer);
            })
            .map(|_| ())
    }

    pub fn get(&self, hash: &Hash256) -> Result<Option<TransactionResult>> {
        let Some(offset) = self.lookup.find(hash)? else {
            return Ok(None);
        };

        let memory = self.file.access()?;
        let mut reader = Reader::new(memory.slice_from(offset));
        Ok(Some(TransactionResult {
            height: reader.get_u32()?,
            index: reader.get_u32()?,
            transaction: Transaction::decode(&mut reader)?,
        }))
    }

    pub fn remove(&self, hash: &Hash256) -> Result<bool> {
        self.lookup.unlink(hash)
    }
}
