//! # Account Asset Table
//!
//! Multimap from account name hash to the assets the account holds. Rows
//! carry the full issuance detail in a fixed, zero-padded slot; storing
//! identical content twice keeps exactly one row, the idempotent-dedup
//! contract of the ownership indices.

use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::chain::{AssetDetail, ShortHash};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

const ROW_SIZE: usize = 256;

pub struct AccountAssetTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<ShortHash>,
}

impl AccountAssetTable {
    pub fn new(
        lookup_path: &std::path::Path,
        rows_path: &std::path::Path,
        gate: RemapGate,
        buckets: u64,
    ) -> Self {
        let lookup_file = Arc::new(MappedFile::new(lookup_path, gate.clone()));
        let rows_file = Arc::new(MappedFile::new(rows_path, gate));

        let table = RecordTable::new(
            lookup_file.clone(),
            FILE_HEADER_SIZE as u64,
            buckets,
            ArrayIndex::BYTES,
        );
        let rows = RecordList::new(rows_file.clone(), FILE_HEADER_SIZE as u64, ROW_SIZE);

        Self {
            lookup_file,
            lookup_header: StoreFileHeader::new(FileKind::Lookup, buckets, ArrayIndex::BYTES as u32),
            rows_file,
            rows_header: StoreFileHeader::new(FileKind::Rows, 0, ROW_SIZE as u32),
            map: Multimap::new(table, rows),
        }
    }

    pub fn create(&self) -> Result<()> {
        self.lookup_file.open()?;
        self.rows_file.open()?;
        write_header(&self.lookup_file, &self.lookup_header)?;
        write_header(&self.rows_file, &self.rows_header)?;
        self.map.create()
    }

    pub fn start(&self) -> Result<()> {
        self.lookup_file.open()?;
        self.rows_file.open()?;
        check_header(&self.lookup_file, &self.lookup_header)?;
        check_header(&self.rows_file, &self.rows_header)?;
        self.map.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.lookup_file.flush()?;
        self.rows_file.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.lookup_file.close()?;
        self.rows_file.close()
    }

    pub fn sync(&self) -> Result<()> {
        self.map.sync()
    }

    /// Record that `account_key` holds `detail`. Identical content already
    /// present makes this a no-op; returns whether a row was added.
    pub fn store(&self, account_key: &ShortHash, detail: &AssetDetail) -> Result<bool> {
        let row = Self::row_bytes(detail)?;
        if self.map.contains_row(account_key, &row)? {
            return Ok(false);
        }
        self.map
            .add_row(account_key, |value| value.copy_from_slice(&row))?;
        Ok(true)
    }

    /// Undo the newest holding row if it matches `detail`.
    pub fn delete_row(&self, account_key: &ShortHash, detail: &AssetDetail) -> Result<bool> {
        let row = Self::row_bytes(detail)?;
        self.map.delete_last_row_if_matches(account_key, &row)
    }

    pub fn delete_last_row(&self, account_key: &ShortHash) -> Result<()> {
        self.map.delete_last_row(account_key)
    }

    /// All holdings of an account, most recently recorded first.
    pub fn get(&self, account_key: &ShortHash) -> Result<Vec<AssetDetail>> {
        let mut details = Vec::new();
        for index in self.map.iter(account_key)? {
            let value = self.map.rows().read_value(index)?;
            details.push(AssetDetail::decode(&mut Reader::new(&value))?);
        }
        Ok(details)
    }

    /// Number of rows currently reachable under `account_key`.
    pub fn row_count(&self, account_key: &ShortHash) -> Result<usize> {
        Ok(self.map.iter(account_key)?.count())
    }

    fn row_bytes(detail: &AssetDetail) -> Result<SmallVec<[u8; 256]>> {
        ensure!(
            detail.serialized_size() <= ROW_SIZE,
            "asset detail for '{}' exceeds the {}-byte row slot",
            detail.symbol,
            ROW_SIZE
        );

        let mut row: SmallVec<[u8; 256]> = SmallVec::from_elem(0, ROW_SIZE);
        let mut writer = Writer::new(&mut row);
        detail.encode(&mut writer);
        writer.pad_to(ROW_SIZE);
        Ok(row)
    }
}
