//! # Account Table
//!
//! Record hash table keyed by the short hash of the account name. Storing
//! an account whose serialized content is already present is a no-op;
//! changed content is rewritten in place rather than chained, so one
//! account name never has two live records.

use std::sync::Arc;

use eyre::{ensure, Result};

use crate::chain::{short_hash, Hash256, ShortHash};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::RecordTable;

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

/// Fixed name slot; the varint length prefix plus the name must fit.
const NAME_SLOT_SIZE: usize = 64;
const VALUE_SIZE: usize = NAME_SLOT_SIZE + 32 + 4 + 1 + 1;

/// Wallet account metadata. Key material never reaches this table in the
/// clear; only the passphrase digest is persisted.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Account {
    pub name: String,
    pub passphrase_hash: Hash256,
    pub hd_index: u32,
    pub priority: u8,
    pub status: u8,
}

impl Account {
    pub fn key(&self) -> ShortHash {
        short_hash(self.name.as_bytes())
    }

    fn encode(&self, value: &mut [u8]) {
        let mut writer = Writer::new(value);
        writer.put_str(&self.name);
        writer.pad_to(NAME_SLOT_SIZE);
        writer.put_bytes(self.passphrase_hash.as_bytes());
        writer.put_u32(self.hd_index);
        writer.put_u8(self.priority);
        writer.put_u8(self.status);
    }

    fn decode(value: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(value);
        let name = reader.get_string()?;
        reader.skip(NAME_SLOT_SIZE - reader.position())?;
        Ok(Self {
            name,
            passphrase_hash: Hash256(reader.get_array()?),
            hd_index: reader.get_u32()?,
            priority: reader.get_u8()?,
            status: reader.get_u8()?,
        })
    }

    fn to_bytes(&self) -> [u8; VALUE_SIZE] {
        let mut raw = [0u8; VALUE_SIZE];
        self.encode(&mut raw);
        raw
    }
}

pub struct AccountTable {
    file: Arc<MappedFile>,
    header: StoreFileHeader,
    lookup: RecordTable<ShortHash>,
}

impl AccountTable {
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

    /// Store or refresh `account`. Identical content is a no-op; changed
    /// content overwrites the existing record in place.
    pub fn store(&self, account: &Account) -> Result<()> {
        ensure!(
            account.name.len() < NAME_SLOT_SIZE,
            "account name '{}' exceeds {} bytes",
            account.name,
            NAME_SLOT_SIZE - 1
        );

        let key = account.key();
        let serialized = account.to_bytes();

        if let Some(offset) = self.lookup.find(&key)? {
            let identical = {
                let memory = self.file.access()?;
                memory.slice(offset, VALUE_SIZE) == serialized
            };
            if !identical {
                self.lookup.update(&key, |value| value.copy_from_slice(&serialized))?;
            }
            return Ok(());
        }

        self.lookup
            .store(&key, |value| value.copy_from_slice(&serialized))
            .map(|_| ())
    }

    pub fn get(&self, key: &ShortHash) -> Result<Option<Account>> {
        let Some(offset) = self.lookup.find(key)? else {
            return Ok(None);
        };
        let memory = self.file.access()?;
        Account::decode(memory.slice(offset, VALUE_SIZE)).map(Some)
    }

    pub fn remove(&self, key: &ShortHash) -> Result<bool> {
        self.lookup.unlink(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::sha256;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> AccountTable {
        let path = dir.join("account_table");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"X").unwrap();

        let table = AccountTable::new(&path, RemapGate::default(), 101);
        table.create().unwrap();
        table
    }

    fn account(name: &str, hd_index: u32) -> Account {
        Account {
            name: name.into(),
            passphrase_hash: sha256(b"passphrase"),
            hd_index,
            priority: 1,
            status: 0,
        }
    }

    #[test]
    fn store_then_get() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let account = account("alice", 3);

        table.store(&account).unwrap();

        assert_eq!(table.get(&account.key()).unwrap(), Some(account));
    }

    #[test]
    fn identical_restore_is_a_noop_and_change_overwrites() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(&account("alice", 1)).unwrap();
        table.store(&account("alice", 1)).unwrap();

        let changed = account("alice", 2);
        table.store(&changed).unwrap();

        assert_eq!(table.get(&changed.key()).unwrap(), Some(changed));
    }

    #[test]
    fn oversized_name_is_rejected() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        assert!(table.store(&account(&"x".repeat(70), 0)).is_err());
    }
}
