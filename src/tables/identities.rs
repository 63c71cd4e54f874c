//! # Identity Table
//!
//! Multimap from payment address to digital-identity rows. Registration
//! binds a symbol to its first address; a transfer re-binds it, appending
//! a row at the new address. The newest row under an address is its
//! current identity state; older rows are the audit history.

use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::chain::{Identity, ShortHash};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

const IDENTITY_SLOT_SIZE: usize = 123;
const ROW_SIZE: usize = 1 + 4 + IDENTITY_SLOT_SIZE;

/// One identity event under an address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IdentityRow {
    /// `true` for the original registration, `false` for a transfer.
    pub registered: bool,
    pub height: u32,
    pub identity: Identity,
}

pub struct IdentityTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<ShortHash>,
}

impl IdentityTable {
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

    /// Record an identity event at `key`; identical content is a no-op.
    pub fn store(
        &self,
        key: &ShortHash,
        registered: bool,
        height: u32,
        identity: &Identity,
    ) -> Result<bool> {
        let row = Self::row_bytes(registered, height, identity)?;
        if self.map.contains_row(key, &row)? {
            return Ok(false);
        }
        self.map.add_row(key, |value| value.copy_from_slice(&row))?;
        Ok(true)
    }

    /// Undo the newest row under `key` if it matches this event.
    pub fn delete_row(
        &self,
        key: &ShortHash,
        registered: bool,
        height: u32,
        identity: &Identity,
    ) -> Result<bool> {
        let row = Self::row_bytes(registered, height, identity)?;
        self.map.delete_last_row_if_matches(key, &row)
    }

    /// Identity events at `key`, newest first.
    pub fn get(&self, key: &ShortHash) -> Result<Vec<IdentityRow>> {
        let mut rows = Vec::new();
        for index in self.map.iter(key)? {
            let value = self.map.rows().read_value(index)?;
            let mut reader = Reader::new(&value);
            rows.push(IdentityRow {
                registered: reader.get_u8()? == 0,
                height: reader.get_u32()?,
                identity: Identity::decode(&mut reader)?,
            });
        }
        Ok(rows)
    }

    fn row_bytes(
        registered: bool,
        height: u32,
        identity: &Identity,
    ) -> Result<SmallVec<[u8; 256]>> {
        ensure!(
            identity.serialized_size() <= IDENTITY_SLOT_SIZE,
            "identity '{}' exceeds the {}-byte row slot",
            identity.symbol,
            IDENTITY_SLOT_SIZE
        );

        let mut row: SmallVec<[u8; 256]> = SmallVec::from_elem(0, ROW_SIZE);
        let mut writer = Writer::new(&mut row);
        writer.put_u8(if registered { 0 } else { 1 });
        writer.put_u32(height);
        identity.encode(&mut writer);
        writer.pad_to(ROW_SIZE);
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::short_hash;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> IdentityTable {
        let gate = RemapGate::default();
        for name in ["identity_table", "identity_rows"] {
            let mut file = std::fs::File::create(dir.join(name)).unwrap();
            file.write_all(b"X").unwrap();
        }

        let table = IdentityTable::new(
            &dir.join("identity_table"),
            &dir.join("identity_rows"),
            gate,
            101,
        );
        table.create().unwrap();
        table
    }

    fn identity(address: &str) -> Identity {
        Identity {
            symbol: "alice".into(),
            address: address.into(),
        }
    }

    #[test]
    fn register_then_transfer_history() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let old_key = short_hash(b"addr-old");
        let new_key = short_hash(b"addr-new");

        table.store(&old_key, true, 1, &identity("addr-old")).unwrap();
        table.store(&new_key, false, 5, &identity("addr-new")).unwrap();

        let old_rows = table.get(&old_key).unwrap();
        assert!(old_rows[0].registered);

        let new_rows = table.get(&new_key).unwrap();
        assert!(!new_rows[0].registered);
        assert_eq!(new_rows[0].height, 5);
    }

    #[test]
    fn matched_delete_undoes_event() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let key = short_hash(b"addr");

        table.store(&key, true, 2, &identity("addr")).unwrap();

        assert!(!table.delete_row(&key, true, 3, &identity("addr")).unwrap());
        assert!(table.delete_row(&key, true, 2, &identity("addr")).unwrap());
        assert!(table.get(&key).unwrap().is_empty());
    }
}
