//! # Primitives Module
//!
//! Disk-resident building blocks layered on [`crate::memory::MappedFile`]:
//!
//! - [`RecordManager`]: fixed-size, index-addressed element array
//! - [`SlabManager`]: variable-size byte ranges addressed by offset
//! - [`HashTableHeader`]: the bucket array of a hash table
//! - [`SlabTable`]: hash table mapping a fixed key to one variable value
//! - [`RecordTable`]: hash table mapping a fixed key to one fixed value
//! - [`RecordList`]: intrusive singly-linked list of fixed rows
//! - [`Multimap`]: key -> many fixed rows, built from the two above
//!
//! ## Linking discipline
//!
//! No structure in this module stores an address. Collision chains and row
//! lists embed a *next* field holding either a slab position (relative to
//! the manager payload) or a record index; both survive file growth and
//! process restart. The all-ones value is the empty sentinel for links and
//! buckets - slab position zero is occupied by the payload-size prefix and
//! record index zero is a real row, so neither can double as a sentinel.
//!
//! ## Concurrency
//!
//! These structures are passive: they assume the caller runs mutations
//! inside the store's single-writer critical section and wraps reads in the
//! sequential-lock retry protocol. The only locking here is the internal
//! mutex each allocator keeps over its size counter.

mod hash_table_header;
mod key;
mod multimap;
mod record_list;
mod record_manager;
mod record_table;
mod slab_manager;
mod slab_table;

pub use hash_table_header::HashTableHeader;
pub use key::{Link, TableKey};
pub use multimap::{Multimap, RowIter};
pub use record_list::RecordList;
pub use record_manager::RecordManager;
pub use record_table::RecordTable;
pub use slab_manager::SlabManager;
pub use slab_table::SlabTable;

/// Absolute or manager-relative byte position in a mapped file.
pub type FileOffset = u64;

/// Index of a fixed-size record within a [`RecordManager`].
pub type ArrayIndex = u32;

/// Bytes reserved in front of the record payload for the record count.
pub const RECORD_COUNT_SIZE: u64 = std::mem::size_of::<ArrayIndex>() as u64;

/// Bytes reserved in front of the slab payload for the payload size; also
/// the position of the first slab, so a valid slab position is never zero.
pub const SLAB_SIZE_PREFIX: u64 = std::mem::size_of::<FileOffset>() as u64;
