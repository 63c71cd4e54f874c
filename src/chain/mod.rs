//! # Chain Module
//!
//! Domain types persisted by the storage engine: hashes and points, the
//! simplified script model (just enough structure to extract payment
//! addresses and stealth announcements - full script interpretation lives
//! outside this crate), transactions, blocks, and the tagged attachment
//! payloads an output can carry beyond its plain value.
//!
//! All wire encodings are fixed little-endian layouts matching the on-disk
//! record formats; a value always serializes to exactly one byte sequence,
//! which the content-addressed dedup of the secondary indices relies on.

pub mod attachment;
pub mod block;
pub mod business;
pub mod hash;
pub mod point;
pub mod script;
pub mod transaction;

pub use attachment::{AssetCert, AssetDetail, AssetTransfer, Attachment, Identity, SubsidyAward};
pub use block::{Block, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_SIGNATURE_SIZE};
pub use business::{
    BusinessHistory, BusinessRecord, HistoryEntry, PointKind, StealthRow, HISTORY_ENTRY_SIZE,
    STEALTH_ROW_SIZE,
};
pub use hash::{sha256, sha256d, short_hash, Hash256, ShortHash};
pub use point::{OutPoint, POINT_SIZE};
pub use script::Script;
pub use transaction::{Input, Output, Transaction};
