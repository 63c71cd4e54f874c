//! # Points
//!
//! A point names one output or input slot of a transaction: the
//! transaction hash plus a 32-bit index. Points key the spend table and
//! identify rows throughout the secondary indices.
//!
//! The spend checksum is a CRC-64 of a point's 36-byte encoding; spend
//! rows carry it so a spent output can be matched back to its unspent row
//! without re-reading the output itself.

use crc::{Crc, CRC_64_XZ};
use eyre::Result;

use crate::encoding::{Reader, Writer};
use crate::primitives::TableKey;

use super::hash::{Hash256, HASH_SIZE};

/// Serialized width: 32-byte hash + 4-byte index.
pub const POINT_SIZE: usize = HASH_SIZE + 4;

const CHECKSUM: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub const fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    /// The sentinel point: coinbase previous output, or "not spent".
    pub const NULL: Self = Self {
        hash: Hash256::NULL,
        index: u32::MAX,
    };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_bytes(self.hash.as_bytes());
        writer.put_u32(self.index);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let hash = Hash256(reader.get_array()?);
        let index = reader.get_u32()?;
        Ok(Self { hash, index })
    }

    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        let mut raw = [0u8; POINT_SIZE];
        let mut writer = Writer::new(&mut raw);
        self.encode(&mut writer);
        raw
    }

    /// Cross-validation checksum of this point's encoding.
    pub fn checksum(&self) -> u64 {
        CHECKSUM.checksum(&self.to_bytes())
    }
}

impl TableKey for OutPoint {
    const LEN: usize = POINT_SIZE;

    fn write_to(&self, out: &mut [u8]) {
        out[..POINT_SIZE].copy_from_slice(&self.to_bytes());
    }

    fn matches(&self, stored: &[u8]) -> bool {
        stored[..POINT_SIZE] == self.to_bytes()
    }

    fn bucket_seed(&self) -> u64 {
        // The hash part alone distributes; the index only distinguishes
        // outputs of one transaction.
        self.hash.bucket_seed() ^ self.index as u64
    }
}
