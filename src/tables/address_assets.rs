//! # Address Asset Table
//!
//! Multimap from payment address to attachment-bearing business rows -
//! the per-address ledger of everything beyond plain value: asset issues
//! and transfers, certificates, identity operations, messages and subsidy
//! awards, plus the spends consuming them.
//!
//! Row layout (fixed size; the attachment occupies a zero-padded slot so
//! identical content always has identical bytes):
//!
//! ```text
//! [ kind:1 ][ point:36 ][ height:4 ][ value_or_checksum:8 ][ attachment slot ]
//! ```
//!
//! Storing a row whose bytes already exist under the key is a no-op, which
//! makes re-pushing a block idempotent; rollback deletes the head row only
//! when it matches the row being undone, the exact inverse.

use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::chain::{Attachment, BusinessRecord, OutPoint, PointKind, ShortHash, POINT_SIZE};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

/// Fixed capacity reserved for an encoded attachment inside a row.
pub const ATTACHMENT_SLOT_SIZE: usize = 256;

const ROW_SIZE: usize = 1 + POINT_SIZE + 4 + 8 + ATTACHMENT_SLOT_SIZE;

pub struct AddressAssetTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<ShortHash>,
}

impl AddressAssetTable {
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

    /// Serialize a record into its fixed row form.
    pub fn row_bytes(record: &BusinessRecord) -> Result<SmallVec<[u8; 512]>> {
        ensure!(
            record.attachment.serialized_size() <= ATTACHMENT_SLOT_SIZE,
            "attachment of {} bytes exceeds the {}-byte row slot",
            record.attachment.serialized_size(),
            ATTACHMENT_SLOT_SIZE
        );

        let mut row: SmallVec<[u8; 512]> = SmallVec::from_elem(0, ROW_SIZE);
        let mut writer = Writer::new(&mut row);
        record.encode(&mut writer);
        writer.pad_to(ROW_SIZE);
        Ok(row)
    }

    /// Record an output event under `key`. Identical content already
    /// present makes this a no-op; returns whether a row was added.
    pub fn store_output(
        &self,
        key: &ShortHash,
        point: &OutPoint,
        height: u32,
        value: u64,
        attachment: &Attachment,
    ) -> Result<bool> {
        self.store(key, &BusinessRecord {
            kind: PointKind::Output,
            point: *point,
            height,
            value_or_checksum: value,
            attachment: attachment.clone(),
        })
    }

    /// Record a spend event under `key`; the attachment slot stays empty -
    /// an input carries no payload of its own.
    pub fn store_input(
        &self,
        key: &ShortHash,
        spender: &OutPoint,
        height: u32,
        previous: &OutPoint,
    ) -> Result<bool> {
        self.store(key, &BusinessRecord {
            kind: PointKind::Spend,
            point: *spender,
            height,
            value_or_checksum: previous.checksum(),
            attachment: Attachment::Value,
        })
    }

    pub fn store(&self, key: &ShortHash, record: &BusinessRecord) -> Result<bool> {
        let row = Self::row_bytes(record)?;
        if self.map.contains_row(key, &row)? {
            return Ok(false);
        }
        self.map.add_row(key, |value| value.copy_from_slice(&row))?;
        Ok(true)
    }

    /// Undo the newest row under `key` if it matches `record`.
    pub fn delete_row(&self, key: &ShortHash, record: &BusinessRecord) -> Result<bool> {
        let row = Self::row_bytes(record)?;
        self.map.delete_last_row_if_matches(key, &row)
    }

    /// Rows for `key`, newest first; `limit` of zero means unlimited, rows
    /// below `from_height` are filtered out.
    pub fn get(
        &self,
        key: &ShortHash,
        limit: usize,
        from_height: u32,
    ) -> Result<Vec<BusinessRecord>> {
        let mut records = Vec::new();
        for index in self.map.iter(key)? {
            if limit != 0 && records.len() == limit {
                break;
            }
            let value = self.map.rows().read_value(index)?;
            let record = BusinessRecord::decode(&mut Reader::new(&value))?;
            if record.height >= from_height {
                records.push(record);
            }
        }
        Ok(records)
    }
}
