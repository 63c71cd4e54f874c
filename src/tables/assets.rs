//! # Asset Table
//!
//! The issued-asset registry: a slab hash table keyed by the SHA-256 of
//! the asset symbol, holding the full issuance detail. Re-storing an
//! identical detail is a content-addressed no-op, so replaying a block is
//! idempotent here; rollback removes the record only if it still matches
//! the detail being rolled back.

use std::sync::Arc;

use eyre::Result;

use crate::chain::{sha256, AssetDetail, Hash256};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::SlabTable;

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

pub struct AssetTable {
    file: Arc<MappedFile>,
    header: StoreFileHeader,
    lookup: SlabTable<Hash256>,
}

impl AssetTable {
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

    pub fn symbol_key(symbol: &str) -> Hash256 {
        sha256(symbol.as_bytes())
    }

    /// Register `detail` under its symbol. A record with identical content
    /// already present makes this a no-op.
    pub fn store(&self, detail: &AssetDetail) -> Result<()> {
        let key = Self::symbol_key(&detail.symbol);
        if self.get(&key)?.as_ref() == Some(detail) {
            return Ok(());
        }

        let value_size = detail.serialized_size();
        self.lookup
            .store(&key, value_size, |value| {
                let mut writer = Writer::new(value);
                detail.encode(&mut writer);
            })
            .map(|_| ())
    }

    pub fn get(&self, key: &Hash256) -> Result<Option<AssetDetail>> {
        let Some(offset) = self.lookup.find(key)? else {
            return Ok(None);
        };
        let memory = self.file.access()?;
        AssetDetail::decode(&mut Reader::new(memory.slice_from(offset))).map(Some)
    }

    pub fn get_by_symbol(&self, symbol: &str) -> Result<Option<AssetDetail>> {
        self.get(&Self::symbol_key(symbol))
    }

    /// Rollback removal: unlink the symbol's record only while it still
    /// matches `detail` (the issuance being undone).
    pub fn remove_if_matches(&self, detail: &AssetDetail) -> Result<bool> {
        let key = Self::symbol_key(&detail.symbol);
        if self.get(&key)?.as_ref() != Some(detail) {
            return Ok(false);
        }
        self.lookup.unlink(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> AssetTable {
        let path = dir.join("asset_table");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"X").unwrap();

        let table = AssetTable::new(&path, RemapGate::default(), 101);
        table.create().unwrap();
        table
    }

    fn detail() -> AssetDetail {
        AssetDetail {
            symbol: "MVS.GOLD".into(),
            max_supply: 1_000_000,
            decimals: 4,
            issuer: "issuer".into(),
            address: "address".into(),
            description: "test asset".into(),
        }
    }

    #[test]
    fn store_then_lookup_by_symbol() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(&detail()).unwrap();

        assert_eq!(table.get_by_symbol("MVS.GOLD").unwrap(), Some(detail()));
        assert_eq!(table.get_by_symbol("MVS.NONE").unwrap(), None);
    }

    #[test]
    fn duplicate_store_is_idempotent() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(&detail()).unwrap();
        table.store(&detail()).unwrap();
        assert!(table.remove_if_matches(&detail()).unwrap());

        // One stored record: after the single removal nothing remains.
        assert_eq!(table.get_by_symbol("MVS.GOLD").unwrap(), None);
    }

    #[test]
    fn mismatched_rollback_leaves_record() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(&detail()).unwrap();

        let mut other = detail();
        other.max_supply = 5;
        assert!(!table.remove_if_matches(&other).unwrap());
        assert_eq!(table.get_by_symbol("MVS.GOLD").unwrap(), Some(detail()));
    }
}
