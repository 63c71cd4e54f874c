//! # Memory Module
//!
//! The foundational layer of the storage engine: growable memory-mapped
//! files with offset-based addressing.
//!
//! ## Why offsets, not pointers
//!
//! A mapped region moves in the process address space whenever the backing
//! file grows past its mapped capacity and is remapped. Any raw pointer
//! obtained before such a growth is dangling afterwards. Every structure
//! above this layer therefore stores *byte offsets* (or record indexes) and
//! redeems them against the live mapping immediately before use, through a
//! short-lived [`Memory`] accessor.
//!
//! ## The remap gate
//!
//! All mapped files of one store share a single `RwLock<()>` (the *remap
//! gate*). Accessors hold the shared side for their whole lifetime; growth
//! takes the exclusive side. A reader resolving an offset can therefore
//! never observe a remap mid-resolution. The gate does **not** serialize
//! data access - that is the job of the sequential lock one layer up.
//!
//! ## Durability
//!
//! Durability is delegated to the OS page cache: `flush()` runs `msync`,
//! `close()` flushes, unmaps and truncates the file back to its logical
//! size. There is no write-ahead log at this layer.

mod mapped_file;

pub use mapped_file::{Memory, MappedFile, RemapGate};

/// Growth factor applied when a mapped file must expand: capacity grows to
/// 150% of the requested size, amortizing remap cost over many allocations.
pub const EXPANSION_NUMERATOR: u64 = 150;
pub const EXPANSION_DENOMINATOR: u64 = 100;
