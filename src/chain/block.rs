//! # Blocks
//!
//! The 80-byte block header is the classic proof-of-work layout. Headers
//! produced by the alternative consensus paths (version 2 proof-of-stake,
//! version 3 delegated) additionally carry a 64-byte witness signature,
//! serialized after the transaction hashes in the block record.

use eyre::{ensure, Result};

use crate::encoding::{Reader, Writer};

use super::hash::{sha256d, Hash256};
use super::transaction::Transaction;

pub const BLOCK_HEADER_SIZE: usize = 4 + 32 + 32 + 4 + 4 + 4;
pub const BLOCK_SIGNATURE_SIZE: usize = 64;

/// Header versions; anything above proof-of-work carries a signature.
pub const VERSION_POW: u32 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    pub version: u32,
    pub previous: Hash256,
    pub merkle: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Block {
    pub header: BlockHeader,
    /// Witness signature; present iff the header version is not
    /// proof-of-work.
    pub signature: Option<[u8; BLOCK_SIGNATURE_SIZE]>,
    pub transactions: Vec<Transaction>,
}

impl BlockHeader {
    pub fn is_proof_of_work(&self) -> bool {
        self.version == VERSION_POW
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u32(self.version);
        writer.put_bytes(self.previous.as_bytes());
        writer.put_bytes(self.merkle.as_bytes());
        writer.put_u32(self.timestamp);
        writer.put_u32(self.bits);
        writer.put_u32(self.nonce);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            version: reader.get_u32()?,
            previous: Hash256(reader.get_array()?),
            merkle: Hash256(reader.get_array()?),
            timestamp: reader.get_u32()?,
            bits: reader.get_u32()?,
            nonce: reader.get_u32()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut raw = [0u8; BLOCK_HEADER_SIZE];
        let mut writer = Writer::new(&mut raw);
        self.encode(&mut writer);
        raw
    }
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// The signature invariant tying presence to the header version.
    pub fn check_signature_presence(&self) -> Result<()> {
        ensure!(
            self.header.is_proof_of_work() == self.signature.is_none(),
            "block {} version {} has mismatched signature presence",
            self.hash(),
            self.header.version
        );
        Ok(())
    }

    pub fn transaction_hashes(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::hash).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            version: VERSION_POW,
            previous: Hash256::ZERO,
            merkle: sha256d(b"merkle"),
            timestamp: 1_500_000_000,
            bits: 0x1D00_FFFF,
            nonce: 7,
        }
    }

    #[test]
    fn header_encoding_is_80_bytes() {
        assert_eq!(header().to_bytes().len(), 80);
    }

    #[test]
    fn header_round_trip() {
        let raw = header().to_bytes();
        let mut reader = Reader::new(&raw);

        assert_eq!(BlockHeader::decode(&mut reader).unwrap(), header());
    }

    #[test]
    fn signature_presence_follows_version() {
        let block = Block {
            header: header(),
            signature: None,
            transactions: Vec::new(),
        };
        assert!(block.check_signature_presence().is_ok());

        let mut signed = block.clone();
        signed.header.version = 2;
        assert!(signed.check_signature_presence().is_err());

        signed.signature = Some([0u8; BLOCK_SIGNATURE_SIZE]);
        assert!(signed.check_signature_presence().is_ok());
    }
}
