//! # Record Multimap
//!
//! One key to many fixed-size rows: a [`RecordTable`] whose 4-byte value is
//! the head index of a linked row list in a [`RecordList`] (usually a
//! separate "rows" file). New rows are prepended, so iteration order from
//! the head is reverse-chronological - most recently added first.
//!
//! `delete_last_row` removes exactly the head row. This LIFO removal is
//! deliberate: chain reorganization rolls a block back by undoing its row
//! additions in reverse, so the row to remove is always the newest one
//! under its key.

use eyre::{bail, Result};

use super::{ArrayIndex, Link, RecordList, RecordTable, TableKey};

pub struct Multimap<K: TableKey> {
    table: RecordTable<K>,
    rows: RecordList,
}

impl<K: TableKey> Multimap<K> {
    /// `table` must have been built with a 4-byte value (the head link).
    pub fn new(table: RecordTable<K>, rows: RecordList) -> Self {
        debug_assert_eq!(table.value_size(), ArrayIndex::BYTES);
        Self { table, rows }
    }

    pub fn create(&self) -> Result<()> {
        self.table.create()?;
        self.rows.create()
    }

    pub fn start(&self) -> Result<()> {
        self.table.start()?;
        self.rows.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.table.sync()?;
        self.rows.sync()
    }

    pub fn rows(&self) -> &RecordList {
        &self.rows
    }

    /// Head row index for `key`, or `None` when the key has no rows.
    pub fn lookup(&self, key: &K) -> Result<Option<ArrayIndex>> {
        let Some(value_offset) = self.table.find(key)? else {
            return Ok(None);
        };

        let memory = self.table.file().access()?;
        Ok(Some(ArrayIndex::read_from(
            memory.slice(value_offset, ArrayIndex::BYTES),
        )))
    }

    /// Prepend a row under `key`, creating the key on first use.
    pub fn add_row(&self, key: &K, write: impl FnOnce(&mut [u8])) -> Result<()> {
        match self.lookup(key)? {
            Some(head) => {
                let index = self.rows.insert(head, write)?;
                self.write_head(key, index, false)
            }
            None => {
                let index = self.rows.insert(ArrayIndex::EMPTY, write)?;
                self.write_head(key, index, true)
            }
        }
    }

    /// Remove the most recently added row under `key` (LIFO). The key
    /// itself is unlinked once its last row is gone.
    pub fn delete_last_row(&self, key: &K) -> Result<()> {
        let Some(head) = self.lookup(key)? else {
            bail!("delete_last_row on a key with no rows");
        };

        let next = self.rows.next(head)?;
        if next == ArrayIndex::EMPTY {
            self.table.unlink(key)?;
        } else {
            self.table.update(key, |value| next.write_to(value))?;
        }
        Ok(())
    }

    /// Remove the head row only if it serializes to exactly `value`.
    /// Rollback of the content-deduplicated indices uses this: a push that
    /// was a content-addressed no-op must pop as a no-op too.
    pub fn delete_last_row_if_matches(&self, key: &K, value: &[u8]) -> Result<bool> {
        let Some(head) = self.lookup(key)? else {
            return Ok(false);
        };
        if self.rows.read_value(head)?.as_slice() != value {
            return Ok(false);
        }
        self.delete_last_row(key)?;
        Ok(true)
    }

    /// Iterate row indexes under `key`, newest first. The sequence is
    /// forward-only and reflects the list as of this call.
    pub fn iter(&self, key: &K) -> Result<RowIter<'_>> {
        Ok(RowIter {
            rows: &self.rows,
            current: self.lookup(key)?.unwrap_or(ArrayIndex::EMPTY),
        })
    }

    /// Whether any row under `key` serializes to exactly `value`. Backs the
    /// content-addressed no-op contract of the secondary indices.
    pub fn contains_row(&self, key: &K, value: &[u8]) -> Result<bool> {
        debug_assert_eq!(value.len(), self.rows.value_size());
        for index in self.iter(key)? {
            if self.rows.read_value(index)?.as_slice() == value {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn write_head(&self, key: &K, index: ArrayIndex, new_key: bool) -> Result<()> {
        if new_key {
            self.table.store(key, |value| index.write_to(value))?;
        } else {
            self.table.update(key, |value| index.write_to(value))?;
        }
        Ok(())
    }
}

/// Forward-only iterator over the row indexes of one key.
pub struct RowIter<'a> {
    rows: &'a RecordList,
    current: ArrayIndex,
}

impl Iterator for RowIter<'_> {
    type Item = ArrayIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == ArrayIndex::EMPTY {
            return None;
        }
        let index = self.current;
        self.current = self.rows.next(index).unwrap_or(ArrayIndex::EMPTY);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MappedFile, RemapGate};
    use std::io::Write as _;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn multimap(dir: &std::path::Path) -> Multimap<[u8; 20]> {
        let gate = RemapGate::default();
        let mut open = |name: &str| {
            let path = dir.join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(b"X").unwrap();
            let mapped = Arc::new(MappedFile::new(path, gate.clone()));
            mapped.open().unwrap();
            mapped
        };

        let table = RecordTable::new(open("lookup"), 0, 13, ArrayIndex::BYTES);
        let rows = RecordList::new(open("rows"), 0, 8);
        let multimap = Multimap::new(table, rows);
        multimap.create().unwrap();
        multimap
    }

    fn row_values(map: &Multimap<[u8; 20]>, key: &[u8; 20]) -> Vec<u64> {
        map.iter(key)
            .unwrap()
            .map(|index| {
                let value = map.rows().read_value(index).unwrap();
                u64::from_le_bytes(value.as_slice().try_into().unwrap())
            })
            .collect()
    }

    fn add(map: &Multimap<[u8; 20]>, key: &[u8; 20], value: u64) {
        map.add_row(key, |row| row.copy_from_slice(&value.to_le_bytes()))
            .unwrap();
    }

    #[test]
    fn iteration_is_reverse_chronological() {
        let dir = tempdir().unwrap();
        let map = multimap(dir.path());
        let key = [1u8; 20];

        add(&map, &key, 1);
        add(&map, &key, 2);
        add(&map, &key, 3);

        assert_eq!(row_values(&map, &key), [3, 2, 1]);
    }

    #[test]
    fn delete_last_row_is_lifo() {
        let dir = tempdir().unwrap();
        let map = multimap(dir.path());
        let key = [2u8; 20];

        add(&map, &key, 1);
        add(&map, &key, 2);
        add(&map, &key, 3);

        map.delete_last_row(&key).unwrap();
        assert_eq!(row_values(&map, &key), [2, 1]);
    }

    #[test]
    fn deleting_final_row_unlinks_key() {
        let dir = tempdir().unwrap();
        let map = multimap(dir.path());
        let key = [3u8; 20];

        add(&map, &key, 9);
        map.delete_last_row(&key).unwrap();

        assert!(map.lookup(&key).unwrap().is_none());
        assert!(map.delete_last_row(&key).is_err());
    }

    #[test]
    fn keys_do_not_interfere() {
        let dir = tempdir().unwrap();
        let map = multimap(dir.path());
        let first = [4u8; 20];
        let second = [5u8; 20];

        add(&map, &first, 10);
        add(&map, &second, 20);
        add(&map, &first, 11);

        assert_eq!(row_values(&map, &first), [11, 10]);
        assert_eq!(row_values(&map, &second), [20]);
    }

    #[test]
    fn contains_row_compares_content() {
        let dir = tempdir().unwrap();
        let map = multimap(dir.path());
        let key = [6u8; 20];

        add(&map, &key, 7);

        assert!(map.contains_row(&key, &7u64.to_le_bytes()).unwrap());
        assert!(!map.contains_row(&key, &8u64.to_le_bytes()).unwrap());
    }
}
