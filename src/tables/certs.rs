//! # Certificate Table
//!
//! Multimap from payment address to asset-certificate rows. Certificates
//! grant symbol capabilities (issue, domain, naming) and move between
//! addresses as ordinary outputs; each movement appends a row here.

use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::chain::{AssetCert, ShortHash};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

const CERT_SLOT_SIZE: usize = 188;
const ROW_SIZE: usize = 4 + CERT_SLOT_SIZE;

/// One certificate event: the holding certificate at a given height.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CertRow {
    pub height: u32,
    pub cert: AssetCert,
}

pub struct CertTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<ShortHash>,
}

impl CertTable {
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

    /// Record `cert` held at `key` as of `height`; identical content is a
    /// no-op.
    pub fn store(&self, key: &ShortHash, height: u32, cert: &AssetCert) -> Result<bool> {
        let row = Self::row_bytes(height, cert)?;
        if self.map.contains_row(key, &row)? {
            return Ok(false);
        }
        self.map.add_row(key, |value| value.copy_from_slice(&row))?;
        Ok(true)
    }

    /// Undo the newest row under `key` if it matches this event.
    pub fn delete_row(&self, key: &ShortHash, height: u32, cert: &AssetCert) -> Result<bool> {
        let row = Self::row_bytes(height, cert)?;
        self.map.delete_last_row_if_matches(key, &row)
    }

    /// Certificate events at `key`, newest first.
    pub fn get(&self, key: &ShortHash) -> Result<Vec<CertRow>> {
        let mut certs = Vec::new();
        for index in self.map.iter(key)? {
            let value = self.map.rows().read_value(index)?;
            let mut reader = Reader::new(&value);
            certs.push(CertRow {
                height: reader.get_u32()?,
                cert: AssetCert::decode(&mut reader)?,
            });
        }
        Ok(certs)
    }

    fn row_bytes(height: u32, cert: &AssetCert) -> Result<SmallVec<[u8; 256]>> {
        ensure!(
            cert.serialized_size() <= CERT_SLOT_SIZE,
            "certificate for '{}' exceeds the {}-byte row slot",
            cert.symbol,
            CERT_SLOT_SIZE
        );

        let mut row: SmallVec<[u8; 256]> = SmallVec::from_elem(0, ROW_SIZE);
        let mut writer = Writer::new(&mut row);
        writer.put_u32(height);
        cert.encode(&mut writer);
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

    fn table(dir: &std::path::Path) -> CertTable {
        let gate = RemapGate::default();
        for name in ["cert_table", "cert_rows"] {
            let mut file = std::fs::File::create(dir.join(name)).unwrap();
            file.write_all(b"X").unwrap();
        }

        let table = CertTable::new(&dir.join("cert_table"), &dir.join("cert_rows"), gate, 101);
        table.create().unwrap();
        table
    }

    fn cert() -> AssetCert {
        AssetCert {
            symbol: "MVS.GOLD".into(),
            owner: "alice".into(),
            address: "addr".into(),
            cert_type: 1,
        }
    }

    #[test]
    fn store_get_delete_round_trip() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let key = short_hash(b"addr");

        assert!(table.store(&key, 7, &cert()).unwrap());
        assert!(!table.store(&key, 7, &cert()).unwrap());

        let rows = table.get(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].height, 7);
        assert_eq!(rows[0].cert, cert());

        assert!(table.delete_row(&key, 7, &cert()).unwrap());
        assert!(table.get(&key).unwrap().is_empty());
    }
}
