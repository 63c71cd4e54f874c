//! # Store Module
//!
//! The storage engine's public face: the [`ChainStore`] table set with its
//! create/start/stop/close lifecycle, the sequential-lock consistency
//! protocol, the interprocess exclusivity lock, and the block push/pop
//! protocol that keeps all twelve tables mutually consistent.

mod chain_store;
mod paths;
mod process_lock;
mod sequential_lock;
mod settings;

#[cfg(test)]
mod tests;

pub use chain_store::ChainStore;
pub use paths::StorePaths;
pub use process_lock::ProcessLock;
pub use sequential_lock::{ReadHandle, SequentialLock, WriteGuard};
pub use settings::Settings;
