//! # Hashes
//!
//! The two digest widths used as table keys: 32-byte hashes identify
//! blocks, transactions and asset symbols; 20-byte short hashes identify
//! payment addresses and accounts. Short hashes are the truncated SHA-256
//! of the identified string.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::primitives::TableKey;

pub const HASH_SIZE: usize = 32;
pub const SHORT_HASH_SIZE: usize = 20;

/// 32-byte digest: block hash, transaction hash, symbol hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash256(pub [u8; HASH_SIZE]);

/// 20-byte digest keying the address-indexed tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShortHash(pub [u8; SHORT_HASH_SIZE]);

impl Hash256 {
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// All-ones hash marking a nonexistent point (coinbase previous
    /// output, unspent sentinel).
    pub const NULL: Self = Self([0xFF; HASH_SIZE]);

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl ShortHash {
    pub fn as_bytes(&self) -> &[u8; SHORT_HASH_SIZE] {
        &self.0
    }
}

pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(data).into())
}

/// Double SHA-256, the block and transaction identity hash.
pub fn sha256d(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(Sha256::digest(data)).into())
}

/// Short hash of an encoded address or account name.
pub fn short_hash(data: &[u8]) -> ShortHash {
    let digest = Sha256::digest(data);
    let mut short = [0u8; SHORT_HASH_SIZE];
    short.copy_from_slice(&digest[..SHORT_HASH_SIZE]);
    ShortHash(short)
}

impl TableKey for Hash256 {
    const LEN: usize = HASH_SIZE;

    fn write_to(&self, out: &mut [u8]) {
        self.0.write_to(out)
    }

    fn matches(&self, stored: &[u8]) -> bool {
        self.0.matches(stored)
    }

    fn bucket_seed(&self) -> u64 {
        self.0.bucket_seed()
    }
}

impl TableKey for ShortHash {
    const LEN: usize = SHORT_HASH_SIZE;

    fn write_to(&self, out: &mut [u8]) {
        self.0.write_to(out)
    }

    fn matches(&self, stored: &[u8]) -> bool {
        self.0.matches(stored)
    }

    fn bucket_seed(&self) -> u64 {
        self.0.bucket_seed()
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}
