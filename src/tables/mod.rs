//! # Tables Module
//!
//! The fixed set of chain-state tables. Each table owns one or two mapped
//! files (a `_table` lookup file, plus a `_rows` or `_index` companion
//! where it needs one), validates a 128-byte header on start, and follows
//! the same lifecycle: `create` stamps fresh files, `start` opens and
//! validates, `stop` flushes, `close` unmaps.
//!
//! | Table              | Shape                       | Key                  |
//! |--------------------|-----------------------------|----------------------|
//! | blocks             | slab table + height index   | block hash / height  |
//! | transactions       | slab table                  | transaction hash     |
//! | spends             | record table                | previous out point   |
//! | history            | multimap                    | payment address      |
//! | stealth            | multimap                    | announcement prefix  |
//! | accounts           | record table                | account name hash    |
//! | account_addresses  | multimap                    | account name hash    |
//! | assets             | slab table                  | symbol hash          |
//! | address_assets     | multimap                    | payment address      |
//! | account_assets     | multimap                    | account name hash    |
//! | certs              | multimap                    | payment address      |
//! | identities         | multimap                    | payment address      |
//!
//! Tables never serialize access themselves; the store's sequential lock
//! brackets every mutation and readers use its retry protocol.

mod account_addresses;
mod account_assets;
mod accounts;
mod address_assets;
mod assets;
mod blocks;
mod certs;
mod file_header;
mod history;
mod identities;
mod spends;
mod stealth;
mod transactions;

pub use account_addresses::{AccountAddress, AccountAddressTable};
pub use account_assets::AccountAssetTable;
pub use accounts::{Account, AccountTable};
pub use address_assets::{AddressAssetTable, ATTACHMENT_SLOT_SIZE};
pub use assets::AssetTable;
pub use blocks::{BlockResult, BlockTable};
pub use certs::{CertRow, CertTable};
pub use file_header::{
    check_header, write_header, FileKind, StoreFileHeader, CURRENT_VERSION, FILE_HEADER_SIZE,
    STORE_MAGIC,
};
pub use history::HistoryTable;
pub use identities::{IdentityRow, IdentityTable};
pub use spends::{SpendRow, SpendTable};
pub use stealth::StealthTable;
pub use transactions::{TransactionResult, TransactionTable};
