//! # History Table
//!
//! Multimap from payment address to history rows. An output received and
//! an input spent each append one row; rollback removes rows newest-first.
//! Iterating a key therefore yields the address's events in
//! reverse-chronological order, which the query helpers rely on.

use std::sync::Arc;

use eyre::Result;

use crate::chain::{HistoryEntry, OutPoint, PointKind, ShortHash, HISTORY_ENTRY_SIZE};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, Link, Multimap, RecordList, RecordTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

pub struct HistoryTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    rows_file: Arc<MappedFile>,
    rows_header: StoreFileHeader,
    map: Multimap<ShortHash>,
}

impl HistoryTable {
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
        let rows = RecordList::new(rows_file.clone(), FILE_HEADER_SIZE as u64, HISTORY_ENTRY_SIZE);

        Self {
            lookup_file,
            lookup_header: StoreFileHeader::new(FileKind::Lookup, buckets, ArrayIndex::BYTES as u32),
            rows_file,
            rows_header: StoreFileHeader::new(FileKind::Rows, 0, HISTORY_ENTRY_SIZE as u32),
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

    /// Record an output received by `key`.
    pub fn add_output(
        &self,
        key: &ShortHash,
        point: &OutPoint,
        height: u32,
        value: u64,
    ) -> Result<()> {
        self.add_row(
            key,
            &HistoryEntry {
                kind: PointKind::Output,
                point: *point,
                height,
                value_or_checksum: value,
            },
        )
    }

    /// Record an input of `key` spending `previous`; the row carries the
    /// previous point's checksum for later matching.
    pub fn add_input(
        &self,
        key: &ShortHash,
        spender: &OutPoint,
        height: u32,
        previous: &OutPoint,
    ) -> Result<()> {
        self.add_row(
            key,
            &HistoryEntry {
                kind: PointKind::Spend,
                point: *spender,
                height,
                value_or_checksum: previous.checksum(),
            },
        )
    }

    pub fn delete_last_row(&self, key: &ShortHash) -> Result<()> {
        self.map.delete_last_row(key)
    }

    /// Rows for `key`, newest first. `limit` of zero means unlimited;
    /// rows below `from_height` are filtered out.
    pub fn get(&self, key: &ShortHash, limit: usize, from_height: u32) -> Result<Vec<HistoryEntry>> {
        let mut entries = Vec::new();
        for index in self.map.iter(key)? {
            if limit != 0 && entries.len() == limit {
                break;
            }
            let entry = self.read_row(index)?;
            if entry.height >= from_height {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn add_row(&self, key: &ShortHash, entry: &HistoryEntry) -> Result<()> {
        self.map.add_row(key, |row| {
            let mut writer = Writer::new(row);
            entry.encode(&mut writer);
        })
    }

    fn read_row(&self, index: ArrayIndex) -> Result<HistoryEntry> {
        let value = self.map.rows().read_value(index)?;
        HistoryEntry::decode(&mut Reader::new(&value))
    }
}
