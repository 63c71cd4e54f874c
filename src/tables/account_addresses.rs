//! # Account Address Table
//!
//! Multimap from account name hash to the addresses the account owns.
//! Maintained by the wallet layer, not by block push/pop; rows are
//! content-deduplicated so re-importing a wallet is idempotent.

use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::chain::ShortHash;
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

const ROW_SIZE: usize = 224;
const SCALARS_SIZE: usize = 4 + 8;

/// One owned address: derivation metadata plus a cached balance.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AccountAddress {
    pub name: String,
    pub public_key: String,
    pub hd_index: u32,
    pub balance: u64,
    pub alias: String,
    pub address: String,
}

impl AccountAddress {
    fn encode(&self, row: &mut [u8]) {
        let mut writer = Writer::new(row);
        writer.put_str(&self.name);
        writer.put_str(&self.public_key);
        writer.put_u32(self.hd_index);
        writer.put_u64(self.balance);
        writer.put_str(&self.alias);
        writer.put_str(&self.address);
        writer.pad_to(ROW_SIZE);
    }

    fn decode(row: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(row);
        Ok(Self {
            name: reader.get_string()?,
            public_key: reader.get_string()?,
            hd_index: reader.get_u32()?,
            balance: reader.get_u64()?,
            alias: reader.get_string()?,
            address: reader.get_string()?,
        })
    }

    fn serialized_size(&self) -> usize {
        use crate::encoding::wire::sized_bytes_len;
        sized_bytes_len(self.name.as_bytes())
            + sized_bytes_len(self.public_key.as_bytes())
            + SCALARS_SIZE
            + sized_bytes_len(self.alias.as_bytes())
            + sized_bytes_len(self.address.as_bytes())
    }
}

pub struct AccountAddressTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<ShortHash>,
}

impl AccountAddressTable {
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

    /// Add an address under `account_key`; identical content is a no-op.
    pub fn store(&self, account_key: &ShortHash, address: &AccountAddress) -> Result<bool> {
        ensure!(
            address.serialized_size() <= ROW_SIZE,
            "account address row for '{}' exceeds {} bytes",
            address.address,
            ROW_SIZE
        );

        let mut row: SmallVec<[u8; 256]> = SmallVec::from_elem(0, ROW_SIZE);
        address.encode(&mut row);

        if self.map.contains_row(account_key, &row)? {
            return Ok(false);
        }
        self.map
            .add_row(account_key, |value| value.copy_from_slice(&row))?;
        Ok(true)
    }

    pub fn delete_last_row(&self, account_key: &ShortHash) -> Result<()> {
        self.map.delete_last_row(account_key)
    }

    /// All addresses of an account, most recently added first.
    pub fn get(&self, account_key: &ShortHash) -> Result<Vec<AccountAddress>> {
        let mut addresses = Vec::new();
        for index in self.map.iter(account_key)? {
            let value = self.map.rows().read_value(index)?;
            addresses.push(AccountAddress::decode(&value)?);
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::short_hash;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> AccountAddressTable {
        let gate = RemapGate::default();
        for name in ["account_address_table", "account_address_rows"] {
            let mut file = std::fs::File::create(dir.join(name)).unwrap();
            file.write_all(b"X").unwrap();
        }

        let table = AccountAddressTable::new(
            &dir.join("account_address_table"),
            &dir.join("account_address_rows"),
            gate,
            101,
        );
        table.create().unwrap();
        table
    }

    fn address(hd_index: u32) -> AccountAddress {
        AccountAddress {
            name: "alice".into(),
            public_key: "xpub-test".into(),
            hd_index,
            balance: 0,
            alias: "main".into(),
            address: format!("addr-{hd_index}"),
        }
    }

    #[test]
    fn store_and_enumerate() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let key = short_hash(b"alice");

        assert!(table.store(&key, &address(0)).unwrap());
        assert!(table.store(&key, &address(1)).unwrap());

        let rows = table.get(&key).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], address(1));
        assert_eq!(rows[1], address(0));
    }

    #[test]
    fn duplicate_store_is_a_noop() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let key = short_hash(b"alice");

        assert!(table.store(&key, &address(0)).unwrap());
        assert!(!table.store(&key, &address(0)).unwrap());
        assert_eq!(table.get(&key).unwrap().len(), 1);
    }
}
