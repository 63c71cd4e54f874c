//! # Script
//!
//! Opaque script bytes plus the two template recognizers the storage
//! engine needs: payment-address extraction for the history and
//! attachment indices, and stealth-announcement extraction for the
//! stealth index. Script *interpretation* (validation, signature checks)
//! is an external collaborator's job; nothing here executes a script.
//!
//! Recognized templates:
//!
//! ```text
//! pay-to-public-key-hash:  OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
//! pay-to-script-hash:      OP_HASH160 <20 bytes> OP_EQUAL
//! stealth announcement:    OP_RETURN <36 bytes: ephemeral key + prefix>
//! ```

use eyre::Result;

use crate::encoding::{wire::sized_bytes_len, Reader, Writer};

use super::hash::{Hash256, ShortHash, HASH_SIZE, SHORT_HASH_SIZE};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xA9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xAC;
const OP_RETURN: u8 = 0x6A;

const STEALTH_PAYLOAD: usize = HASH_SIZE + 4;

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard pay-to-public-key-hash locking script for `address`.
    pub fn pay_to_address(address: &ShortHash) -> Self {
        let mut bytes = Vec::with_capacity(SHORT_HASH_SIZE + 5);
        bytes.push(OP_DUP);
        bytes.push(OP_HASH160);
        bytes.push(SHORT_HASH_SIZE as u8);
        bytes.extend_from_slice(address.as_bytes());
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Self(bytes)
    }

    /// Stealth announcement carrying the ephemeral key and filter prefix.
    pub fn stealth_announce(ephemeral_key: &Hash256, prefix: u32) -> Self {
        let mut bytes = Vec::with_capacity(STEALTH_PAYLOAD + 2);
        bytes.push(OP_RETURN);
        bytes.push(STEALTH_PAYLOAD as u8);
        bytes.extend_from_slice(ephemeral_key.as_bytes());
        bytes.extend_from_slice(&prefix.to_le_bytes());
        Self(bytes)
    }

    /// The payment address this script pays, if it matches a standard
    /// template. Non-standard scripts simply produce no address rows.
    pub fn payment_address(&self) -> Option<ShortHash> {
        let bytes = self.0.as_slice();
        match bytes {
            // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
            [OP_DUP, OP_HASH160, 0x14, rest @ ..]
                if rest.len() == SHORT_HASH_SIZE + 2
                    && rest[SHORT_HASH_SIZE] == OP_EQUALVERIFY
                    && rest[SHORT_HASH_SIZE + 1] == OP_CHECKSIG =>
            {
                let mut hash = [0u8; SHORT_HASH_SIZE];
                hash.copy_from_slice(&rest[..SHORT_HASH_SIZE]);
                Some(ShortHash(hash))
            }
            // OP_HASH160 <20> OP_EQUAL
            [OP_HASH160, 0x14, rest @ ..]
                if rest.len() == SHORT_HASH_SIZE + 1 && rest[SHORT_HASH_SIZE] == OP_EQUAL =>
            {
                let mut hash = [0u8; SHORT_HASH_SIZE];
                hash.copy_from_slice(&rest[..SHORT_HASH_SIZE]);
                Some(ShortHash(hash))
            }
            _ => None,
        }
    }

    /// The ephemeral key and prefix of a stealth announcement, if this is
    /// one.
    pub fn stealth_announcement(&self) -> Option<(Hash256, u32)> {
        let bytes = self.0.as_slice();
        match bytes {
            [OP_RETURN, len, payload @ ..]
                if *len as usize == STEALTH_PAYLOAD && payload.len() == STEALTH_PAYLOAD =>
            {
                let mut key = [0u8; HASH_SIZE];
                key.copy_from_slice(&payload[..HASH_SIZE]);
                let prefix = u32::from_le_bytes([
                    payload[HASH_SIZE],
                    payload[HASH_SIZE + 1],
                    payload[HASH_SIZE + 2],
                    payload[HASH_SIZE + 3],
                ]);
                Some((Hash256(key), prefix))
            }
            _ => None,
        }
    }

    pub fn serialized_size(&self) -> usize {
        sized_bytes_len(&self.0)
    }

    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_sized_bytes(&self.0);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self(reader.get_sized_bytes()?.to_vec()))
    }
}
