//! # Business Records
//!
//! Value types of the address-keyed secondary indices. A *record* captures
//! one point event - an output received or an input spent - under a
//! payment address; a *history* entry is the joined unspent/spent view the
//! query layer hands to callers.
//!
//! Rows are append-only. A spend never mutates the unspent row it
//! consumes; it adds a second row whose checksum field links the two.
//! Rollback removes rows, newest first, and never edits one in place.

use eyre::{bail, Result};

use crate::encoding::{Reader, Writer};

use super::attachment::Attachment;
use super::hash::{Hash256, ShortHash};
use super::point::{OutPoint, POINT_SIZE};

/// Whether a row records an output received or an input spent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointKind {
    Output = 0,
    Spend = 1,
}

impl PointKind {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(PointKind::Output),
            1 => Ok(PointKind::Spend),
            other => bail!("invalid point kind: {}", other),
        }
    }
}

/// One row of the plain address history index:
/// `[kind:1][point:36][height:4][value_or_checksum:8]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HistoryEntry {
    pub kind: PointKind,
    pub point: OutPoint,
    pub height: u32,
    /// Output value for `kind == Output`; checksum of the spent previous
    /// point for `kind == Spend`.
    pub value_or_checksum: u64,
}

pub const HISTORY_ENTRY_SIZE: usize = 1 + POINT_SIZE + 4 + 8;

impl HistoryEntry {
    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u8(self.kind as u8);
        self.point.encode(writer);
        writer.put_u32(self.height);
        writer.put_u64(self.value_or_checksum);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            kind: PointKind::from_u8(reader.get_u8()?)?,
            point: OutPoint::decode(reader)?,
            height: reader.get_u32()?,
            value_or_checksum: reader.get_u64()?,
        })
    }
}

/// Joined unspent/spent view of one received output. `spend` is the null
/// point and `spend_height` is `u32::MAX` while the output is unspent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BusinessHistory {
    pub output: OutPoint,
    pub output_height: u32,
    pub value: u64,
    pub spend: OutPoint,
    pub spend_height: u32,
}

impl BusinessHistory {
    pub const UNSPENT_HEIGHT: u32 = u32::MAX;

    pub fn is_spent(&self) -> bool {
        self.spend_height != Self::UNSPENT_HEIGHT
    }
}

/// One row of the attachment-bearing business indices:
/// `[kind:1][point:36][height:4][value_or_checksum:8][attachment...]`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BusinessRecord {
    pub kind: PointKind,
    pub point: OutPoint,
    pub height: u32,
    pub value_or_checksum: u64,
    pub attachment: Attachment,
}

impl BusinessRecord {
    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u8(self.kind as u8);
        self.point.encode(writer);
        writer.put_u32(self.height);
        writer.put_u64(self.value_or_checksum);
        self.attachment.encode(writer);
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            kind: PointKind::from_u8(reader.get_u8()?)?,
            point: OutPoint::decode(reader)?,
            height: reader.get_u32()?,
            value_or_checksum: reader.get_u64()?,
            attachment: Attachment::decode(reader)?,
        })
    }
}

/// One row of the stealth index, keyed by the announcement prefix:
/// `[height:4][ephemeral_key:32][address:20][tx_hash:32]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StealthRow {
    pub height: u32,
    pub ephemeral_key: Hash256,
    pub address: ShortHash,
    pub transaction_hash: Hash256,
}

pub const STEALTH_ROW_SIZE: usize = 4 + 32 + 20 + 32;

impl StealthRow {
    pub fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u32(self.height);
        writer.put_bytes(self.ephemeral_key.as_bytes());
        writer.put_bytes(self.address.as_bytes());
        writer.put_bytes(self.transaction_hash.as_bytes());
    }

    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            height: reader.get_u32()?,
            ephemeral_key: Hash256(reader.get_array()?),
            address: ShortHash(reader.get_array()?),
            transaction_hash: Hash256(reader.get_array()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::hash::{sha256, short_hash};

    #[test]
    fn history_entry_round_trip() {
        let entry = HistoryEntry {
            kind: PointKind::Output,
            point: OutPoint::new(sha256(b"tx"), 0),
            height: 10,
            value_or_checksum: 100,
        };

        let mut buf = [0u8; HISTORY_ENTRY_SIZE];
        let mut writer = Writer::new(&mut buf);
        entry.encode(&mut writer);
        assert_eq!(writer.position(), HISTORY_ENTRY_SIZE);

        let mut reader = Reader::new(&buf);
        assert_eq!(HistoryEntry::decode(&mut reader).unwrap(), entry);
    }

    #[test]
    fn invalid_point_kind_is_an_error() {
        assert!(PointKind::from_u8(2).is_err());
    }

    #[test]
    fn stealth_row_round_trip() {
        let row = StealthRow {
            height: 5,
            ephemeral_key: sha256(b"ephemeral"),
            address: short_hash(b"addr"),
            transaction_hash: sha256(b"tx"),
        };

        let mut buf = [0u8; STEALTH_ROW_SIZE];
        let mut writer = Writer::new(&mut buf);
        row.encode(&mut writer);

        let mut reader = Reader::new(&buf);
        assert_eq!(StealthRow::decode(&mut reader).unwrap(), row);
    }
}
