//! # Block Table
//!
//! Blocks live in two files: a slab hash table keyed by block hash, and a
//! dense height index mapping each height to the byte position of its
//! block's slab. Block record layout:
//!
//! ```text
//! [ header:80       ]
//! [ height:4        ]
//! [ tx_count:4      ]
//! [ tx_hash:32 x n  ]
//! [ signature:64    ]   only for non-proof-of-work header versions
//! ```
//!
//! The height index grows on demand. Storing a block above the current top
//! zero-fills the intermediate entries - position zero never names a real
//! slab, so it doubles as the "unwritten" sentinel that the gap queries
//! scan for. Parallel import deliberately creates such gaps; a height must
//! not be treated as part of the confirmed chain until no gap remains
//! below it.

use std::sync::Arc;

use eyre::{ensure, Result};

use crate::chain::{
    Block, BlockHeader, Hash256, BLOCK_HEADER_SIZE, BLOCK_SIGNATURE_SIZE,
};
use crate::encoding::{Reader, Writer};
use crate::memory::{MappedFile, RemapGate};
use crate::primitives::{ArrayIndex, FileOffset, RecordManager, SlabTable};

use super::file_header::{
    check_header, write_header, FileKind, StoreFileHeader, FILE_HEADER_SIZE,
};

/// Height-index sentinel for a height imported out of order but not yet
/// written. Valid slab positions start after the payload-size prefix.
const EMPTY_POSITION: FileOffset = 0;

const POSITION_SIZE: usize = 8;

pub struct BlockTable {
    lookup_file: Arc<MappedFile>,
    lookup_header: StoreFileHeader,
    lookup: SlabTable<Hash256>,
    index_file: Arc<MappedFile>,
    index_header: StoreFileHeader,
    index: RecordManager,
}

/// Decoded block record; transactions are resolved separately through the
/// transaction table.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockResult {
    pub header: BlockHeader,
    pub height: u32,
    pub transaction_hashes: Vec<Hash256>,
    pub signature: Option<[u8; BLOCK_SIGNATURE_SIZE]>,
}

impl BlockTable {
    pub fn new(
        lookup_path: &std::path::Path,
        index_path: &std::path::Path,
        gate: RemapGate,
        buckets: u64,
    ) -> Self {
        let lookup_file = Arc::new(MappedFile::new(lookup_path, gate.clone()));
        let index_file = Arc::new(MappedFile::new(index_path, gate));

        let lookup = SlabTable::new(lookup_file.clone(), FILE_HEADER_SIZE as u64, buckets);
        let index = RecordManager::new(index_file.clone(), FILE_HEADER_SIZE as u64, POSITION_SIZE);

        Self {
            lookup_file,
            lookup_header: StoreFileHeader::new(FileKind::Lookup, buckets, 0),
            lookup,
            index_file,
            index_header: StoreFileHeader::new(FileKind::Index, 0, POSITION_SIZE as u32),
            index,
        }
    }

    pub fn create(&self) -> Result<()> {
        self.lookup_file.open()?;
        self.index_file.open()?;
        write_header(&self.lookup_file, &self.lookup_header)?;
        write_header(&self.index_file, &self.index_header)?;
        self.lookup.create()?;
        self.index.create()
    }

    pub fn start(&self) -> Result<()> {
        self.lookup_file.open()?;
        self.index_file.open()?;
        check_header(&self.lookup_file, &self.lookup_header)?;
        check_header(&self.index_file, &self.index_header)?;
        self.lookup.start()?;
        self.index.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.lookup_file.flush()?;
        self.index_file.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.lookup_file.close()?;
        self.index_file.close()
    }

    pub fn sync(&self) -> Result<()> {
        self.lookup.sync()?;
        self.index.sync()
    }

    /// Store a block record and point the height index at it.
    pub fn store(&self, block: &Block, height: u64) -> Result<()> {
        ensure!(height < u32::MAX as u64, "height {} out of range", height);
        block.check_signature_presence()?;

        let hashes = block.transaction_hashes();
        let tx_count = hashes.len();
        ensure!(tx_count <= u32::MAX as usize, "transaction count overflow");

        let value_size = BLOCK_HEADER_SIZE
            + 4
            + 4
            + tx_count * 32
            + block.signature.map_or(0, |_| BLOCK_SIGNATURE_SIZE);

        let position = self.lookup.store(&block.hash(), value_size, |value| {
            let mut writer = Writer::new(value);
            block.header.encode(&mut writer);
            writer.put_u32(height as u32);
            writer.put_u32(tx_count as u32);
            for hash in &hashes {
                writer.put_bytes(hash.as_bytes());
            }
            if let Some(signature) = &block.signature {
                writer.put_bytes(signature);
            }
        })?;

        self.write_position(position, height as u32)
    }

    pub fn get(&self, height: u64) -> Result<Option<BlockResult>> {
        if height >= self.index.count() as u64 {
            return Ok(None);
        }
        let position = self.read_position(height as ArrayIndex)?;
        if position == EMPTY_POSITION {
            return Ok(None);
        }
        self.read_record(self.lookup.value_offset(position))
            .map(Some)
    }

    pub fn get_by_hash(&self, hash: &Hash256) -> Result<Option<BlockResult>> {
        match self.lookup.find(hash)? {
            Some(offset) => self.read_record(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Height recorded for `hash`, if the block is stored.
    pub fn height_of(&self, hash: &Hash256) -> Result<Option<u64>> {
        Ok(self
            .get_by_hash(hash)?
            .map(|result| result.height as u64))
    }

    /// The highest allocated height, independent of gaps below it.
    pub fn top(&self) -> Option<u64> {
        match self.index.count() {
            0 => None,
            count => Some(count as u64 - 1),
        }
    }

    /// First and last unwritten heights, or `None` when the index is
    /// gapless.
    pub fn gap_range(&self) -> Result<Option<(u64, u64)>> {
        let count = self.index.count();

        let mut first = None;
        for height in 0..count {
            if self.read_position(height)? == EMPTY_POSITION {
                first = Some(height as u64);
                break;
            }
        }
        let Some(first) = first else {
            return Ok(None);
        };

        for height in (0..count).rev() {
            if self.read_position(height)? == EMPTY_POSITION {
                return Ok(Some((first, height as u64)));
            }
        }
        Ok(Some((first, first)))
    }

    /// First unwritten height at or after `start`. With no interior gap
    /// remaining this is one past the top - the next height to import.
    pub fn next_gap(&self, start: u64) -> Result<u64> {
        let count = self.index.count() as u64;
        for height in start.min(count)..count {
            if self.read_position(height as ArrayIndex)? == EMPTY_POSITION {
                return Ok(height);
            }
        }
        Ok(start.max(count))
    }

    /// Roll the height index back so `from_height` and everything above it
    /// are gone. Slabs are unlinked separately via `remove`.
    pub fn unlink(&self, from_height: u64) {
        if self.index.count() as u64 > from_height {
            self.index.set_count(from_height as ArrayIndex);
        }
    }

    /// Unlink a block record from the hash lookup.
    pub fn remove(&self, hash: &Hash256) -> Result<bool> {
        self.lookup.unlink(hash)
    }

    /// Record `height -> position`, growing the index and zero-filling any
    /// intermediate heights created by out-of-order import. Runs inside
    /// the writer critical section; growth itself is serialized by the
    /// remap gate.
    fn write_position(&self, position: FileOffset, height: ArrayIndex) -> Result<()> {
        let new_count = height + 1;
        let initial_count = self.index.count();

        if new_count > initial_count {
            let created = new_count - initial_count;
            self.index.new_records(created)?;
            self.zeroize(initial_count, created - 1)?;
        }

        let memory = self.index_file.access()?;
        memory.write(self.index.record_offset(height), &position.to_le_bytes());
        Ok(())
    }

    fn zeroize(&self, first: ArrayIndex, count: ArrayIndex) -> Result<()> {
        let memory = self.index_file.access()?;
        for index in first..first + count {
            memory.write(
                self.index.record_offset(index),
                &EMPTY_POSITION.to_le_bytes(),
            );
        }
        Ok(())
    }

    fn read_position(&self, height: ArrayIndex) -> Result<FileOffset> {
        let memory = self.index_file.access()?;
        let bytes = memory.slice(self.index.record_offset(height), POSITION_SIZE);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn read_record(&self, offset: FileOffset) -> Result<BlockResult> {
        let memory = self.lookup_file.access()?;
        let mut reader = Reader::new(memory.slice_from(offset));

        let header = BlockHeader::decode(&mut reader)?;
        let height = reader.get_u32()?;
        let tx_count = reader.get_u32()? as usize;

        let mut transaction_hashes = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transaction_hashes.push(Hash256(reader.get_array()?));
        }

        let signature = if header.is_proof_of_work() {
            None
        } else {
            Some(reader.get_array::<BLOCK_SIGNATURE_SIZE>()?)
        };

        Ok(BlockResult {
            header,
            height,
            transaction_hashes,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::block::VERSION_POW;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path) -> BlockTable {
        let gate = RemapGate::default();
        for name in ["block_table", "block_index"] {
            let mut file = std::fs::File::create(dir.join(name)).unwrap();
            file.write_all(b"X").unwrap();
        }

        let table = BlockTable::new(
            &dir.join("block_table"),
            &dir.join("block_index"),
            gate,
            101,
        );
        table.create().unwrap();
        table
    }

    fn block(nonce: u32) -> Block {
        Block {
            header: BlockHeader {
                version: VERSION_POW,
                previous: Hash256::ZERO,
                merkle: Hash256::ZERO,
                timestamp: 1_500_000_000,
                bits: 0x1D00_FFFF,
                nonce,
            },
            signature: None,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn store_then_lookup_by_height_and_hash() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let block = block(1);

        table.store(&block, 0).unwrap();

        let by_height = table.get(0).unwrap().unwrap();
        assert_eq!(by_height.header, block.header);
        assert_eq!(by_height.height, 0);

        let by_hash = table.get_by_hash(&block.hash()).unwrap().unwrap();
        assert_eq!(by_hash, by_height);
        assert_eq!(table.height_of(&block.hash()).unwrap(), Some(0));
    }

    #[test]
    fn out_of_order_import_closes_gaps() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        table.store(&block(0), 0).unwrap();
        table.store(&block(2), 2).unwrap();

        assert_eq!(table.top(), Some(2));
        assert_eq!(table.gap_range().unwrap(), Some((1, 1)));
        assert_eq!(table.next_gap(0).unwrap(), 1);
        assert!(table.get(1).unwrap().is_none());

        table.store(&block(1), 1).unwrap();

        assert_eq!(table.gap_range().unwrap(), None);
        assert_eq!(table.next_gap(0).unwrap(), 3);
    }

    #[test]
    fn unlink_rolls_the_index_back() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());
        let tip = block(9);

        table.store(&block(0), 0).unwrap();
        table.store(&tip, 1).unwrap();

        table.unlink(1);
        table.remove(&tip.hash()).unwrap();

        assert_eq!(table.top(), Some(0));
        assert!(table.get(1).unwrap().is_none());
        assert!(table.get_by_hash(&tip.hash()).unwrap().is_none());
    }

    #[test]
    fn signed_block_round_trips_signature() {
        let dir = tempdir().unwrap();
        let table = table(dir.path());

        let mut signed = block(3);
        signed.header.version = 2;
        signed.signature = Some([0x5A; BLOCK_SIGNATURE_SIZE]);

        table.store(&signed, 0).unwrap();

        let result = table.get(0).unwrap().unwrap();
        assert_eq!(result.signature, Some([0x5A; BLOCK_SIGNATURE_SIZE]));
    }
}
