//! # Stealth Table
//!
//! Multimap keyed by the 4-byte stealth announcement prefix. Scanning
//! wallets filter candidate payments by prefix, then try each row's
//! ephemeral key against their scan keys off-chain.

use std::sync::Arc;

use eyre::Result;

use crate::chain::{StealthRow, STEALTH_ROW_SIZE};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

type PrefixKey = [u8; 4];

pub struct StealthTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<PrefixKey>,
}

impl StealthTable {
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
        let rows = RecordList::new(rows_file.clone(), FILE_HEADER_SIZE as u64, STEALTH_ROW_SIZE);

        Self {
            lookup_file,
            lookup_header: StoreFileHeader::new(FileKind::Lookup, buckets, ArrayIndex::BYTES as u32),
            rows_file,
            rows_header: StoreFileHeader::new(FileKind::Rows, 0, STEALTH_ROW_SIZE as u32),
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

    pub fn store(&self, prefix: u32, row: &StealthRow) -> Result<()> {
        self.map.add_row(&prefix.to_le_bytes(), |value| {
            let mut writer = Writer::new(value);
            row.encode(&mut writer);
        })
    }

    pub fn delete_last_row(&self, prefix: u32) -> Result<()> {
        self.map.delete_last_row(&prefix.to_le_bytes())
    }

    /// Rows under `prefix` at or above `from_height`, newest first.
    pub fn get(&self, prefix: u32, from_height: u32) -> Result<Vec<StealthRow>> {
        let mut rows = Vec::new();
        for index in self.map.iter(&prefix.to_le_bytes())? {
            let value = self.map.rows().read_value(index)?;
            let row = StealthRow::decode(&mut Reader::new(&value))?;
            if row.height >= from_height {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{sha256, short_hash};
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> StealthTable {
        let gate = RemapGate::default();
        for name in ["stealth_table", "stealth_rows"] {
            let mut file = std::fs::File::create(dir.join(name)).unwrap();
            file.write_all(b"X").unwrap();
        }

        let table = StealthTable::new(
            &dir.join("stealth_table"),
            &dir.join("stealth_rows"),
            gate,
            101,
        );
        table.create().unwrap();
        table
    }

    fn row(height: u32, seed: &[u8]) -> StealthRow {
        StealthRow {
            height,
            ephemeral_key: sha256(seed),
            address: short_hash(seed),
            transaction_hash: sha256(seed),
        }
    }

    #[test]
    fn prefix_filtering_and_height_threshold() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(0xAAAA, &row(1, b"one")).unwrap();
        table.store(0xAAAA, &row(5, b"two")).unwrap();
        table.store(0xBBBB, &row(9, b"other")).unwrap();

        let rows = table.get(0xAAAA, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].height, 5);

        assert_eq!(table.get(0xAAAA, 2).unwrap().len(), 1);
        assert_eq!(table.get(0xCCCC, 0).unwrap().len(), 0);
    }

    #[test]
    fn lifo_removal() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(0x1234, &row(1, b"first")).unwrap();
        table.store(0x1234, &row(2, b"second")).unwrap();
        table.delete_last_row(0x1234).unwrap();

        let rows = table.get(0x1234, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].height, 1);
    }
}
