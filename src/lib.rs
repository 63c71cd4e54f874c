//! # chainvault - Embedded Chain-State Storage Engine
//!
//! chainvault is the persistence core of a blockchain node: an embedded,
//! memory-mapped, multi-table key-value store that keeps the chain state
//! (blocks, transactions, spends, address history, stealth outputs, accounts,
//! assets, certificates, digital identities) mutually consistent across block
//! insertion and chain-reorganization rollback.
//!
//! - **Zero-copy data access**: Records are read directly out of mmap slices
//! - **Offset-addressed structures**: Every cross-structure reference is a
//!   byte offset or record index, never a raw pointer, so a file remap can
//!   never leave a dangling reference behind
//! - **Single writer, wait-free readers**: A sequential lock lets any number
//!   of readers proceed without blocking and retry on the rare torn read
//!
//! ## Quick Start
//!
//! ```ignore
//! use chainvault::{ChainStore, Settings};
//!
//! let settings = Settings::new("./chain");
//! ChainStore::initialize(&settings, &genesis)?;
//!
//! let store = ChainStore::new(&settings)?;
//! store.start()?;
//! store.push(&block, 1)?;
//! let result = store.block_at_height(1)?;
//! store.stop()?;
//! ```
//!
//! ## Architecture
//!
//! The engine is layered, leaves first:
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  ChainStore (push/pop, sequential lock)   │
//! ├───────────────────────────────────────────┤
//! │  Tables (blocks, history, assets, ...)    │
//! ├───────────────────────────────────────────┤
//! │  Hash tables / multimap primitives        │
//! ├───────────────────────────────────────────┤
//! │  Record & slab allocators                 │
//! ├───────────────────────────────────────────┤
//! │  Growable memory-mapped files             │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! One directory per store, one pair of files per table:
//!
//! ```text
//! chain_dir/
//! ├── block_table          # block hash -> record slab
//! ├── block_index          # height -> record offset (dense, gap-aware)
//! ├── transaction_table
//! ├── spend_table
//! ├── history_table        # address -> row list head
//! ├── history_rows
//! ├── stealth_table
//! ├── stealth_rows
//! ├── account_table
//! ├── account_address_table
//! ├── account_address_rows
//! ├── asset_table
//! ├── address_asset_table
//! ├── address_asset_rows
//! ├── account_asset_table
//! ├── account_asset_rows
//! ├── cert_table
//! ├── cert_rows
//! ├── identity_table
//! ├── identity_rows
//! └── process_lock         # interprocess exclusivity
//! ```
//!
//! ## Module Overview
//!
//! - [`memory`]: Growable memory-mapped files and offset accessors
//! - [`primitives`]: Record/slab allocators, hash tables, multimap
//! - [`encoding`]: Little-endian wire codec and varint
//! - [`chain`]: Blocks, transactions, attachments, business records
//! - [`tables`]: The fixed set of chain-state tables
//! - [`store`]: Table-set lifecycle, sequential lock, push/pop protocol

pub mod chain;
pub mod encoding;
pub mod memory;
pub mod primitives;
pub mod store;
pub mod tables;

pub use store::{ChainStore, ReadHandle, Settings};
