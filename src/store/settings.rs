//! # Store Settings
//!
//! Construction-time configuration: the store directory, the heights
//! below which history and stealth indexing are skipped, and the bucket
//! counts the hash tables are created with.
//!
//! Bucket counts are baked into each file at `create()` and validated at
//! `start()`; changing them requires a reindex. The defaults suit tests
//! and small deployments - a mainnet-scale node raises them (the original
//! deployment used ~600k buckets for blocks and ~97M for address
//! history) at the cost of proportionally larger lookup files.

use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Settings {
    pub directory: PathBuf,

    /// Heights below this produce no address-history or business rows.
    pub history_start_height: u32,

    /// Heights below this produce no stealth rows.
    pub stealth_start_height: u32,

    pub block_buckets: u64,
    pub transaction_buckets: u64,
    pub spend_buckets: u64,
    pub history_buckets: u64,
    pub stealth_buckets: u64,

    /// Bucket count shared by the account, asset, certificate and
    /// identity registries.
    pub registry_buckets: u64,
}

impl Settings {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            history_start_height: 0,
            stealth_start_height: 0,
            block_buckets: 100_003,
            transaction_buckets: 100_003,
            spend_buckets: 100_003,
            history_buckets: 100_003,
            stealth_buckets: 10_007,
            registry_buckets: 10_007,
        }
    }

    /// Small bucket counts for unit tests and throwaway stores.
    pub fn minimal<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            block_buckets: 101,
            transaction_buckets: 101,
            spend_buckets: 101,
            history_buckets: 101,
            stealth_buckets: 101,
            registry_buckets: 101,
            ..Self::new(directory)
        }
    }
}
