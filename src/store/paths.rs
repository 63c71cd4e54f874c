//! # Store Paths
//!
//! The fixed file layout of one store directory: a `_table` lookup file
//! per table, a `_rows` companion per multimap, the dense `block_index`,
//! and the interprocess lock file.

use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

pub struct StorePaths {
    pub blocks_lookup: PathBuf,
    pub blocks_index: PathBuf,
    pub transactions_lookup: PathBuf,
    pub spends_lookup: PathBuf,
    pub history_lookup: PathBuf,
    pub history_rows: PathBuf,
    pub stealth_lookup: PathBuf,
    pub stealth_rows: PathBuf,
    pub accounts_lookup: PathBuf,
    pub account_addresses_lookup: PathBuf,
    pub account_addresses_rows: PathBuf,
    pub assets_lookup: PathBuf,
    pub address_assets_lookup: PathBuf,
    pub address_assets_rows: PathBuf,
    pub account_assets_lookup: PathBuf,
    pub account_assets_rows: PathBuf,
    pub certs_lookup: PathBuf,
    pub certs_rows: PathBuf,
    pub identities_lookup: PathBuf,
    pub identities_rows: PathBuf,
    pub store_lock: PathBuf,
}

impl StorePaths {
    pub fn new(prefix: &Path) -> Self {
        Self {
            blocks_lookup: prefix.join("block_table"),
            blocks_index: prefix.join("block_index"),
            transactions_lookup: prefix.join("transaction_table"),
            spends_lookup: prefix.join("spend_table"),
            history_lookup: prefix.join("history_table"),
            history_rows: prefix.join("history_rows"),
            stealth_lookup: prefix.join("stealth_table"),
            stealth_rows: prefix.join("stealth_rows"),
            accounts_lookup: prefix.join("account_table"),
            account_addresses_lookup: prefix.join("account_address_table"),
            account_addresses_rows: prefix.join("account_address_rows"),
            assets_lookup: prefix.join("asset_table"),
            address_assets_lookup: prefix.join("address_asset_table"),
            address_assets_rows: prefix.join("address_asset_rows"),
            account_assets_lookup: prefix.join("account_asset_table"),
            account_assets_rows: prefix.join("account_asset_rows"),
            certs_lookup: prefix.join("cert_table"),
            certs_rows: prefix.join("cert_rows"),
            identities_lookup: prefix.join("identity_table"),
            identities_rows: prefix.join("identity_rows"),
            store_lock: prefix.join("process_lock"),
        }
    }

    fn data_files(&self) -> [&PathBuf; 20] {
        [
            &self.blocks_lookup,
            &self.blocks_index,
            &self.transactions_lookup,
            &self.spends_lookup,
            &self.history_lookup,
            &self.history_rows,
            &self.stealth_lookup,
            &self.stealth_rows,
            &self.accounts_lookup,
            &self.account_addresses_lookup,
            &self.account_addresses_rows,
            &self.assets_lookup,
            &self.address_assets_lookup,
            &self.address_assets_rows,
            &self.account_assets_lookup,
            &self.account_assets_rows,
            &self.certs_lookup,
            &self.certs_rows,
            &self.identities_lookup,
            &self.identities_rows,
        ]
    }

    /// Seed every data file with one byte so it can be memory-mapped.
    /// Refuses to touch a directory that already holds store files -
    /// first-run initialization must happen at most once.
    pub fn touch_all(&self) -> Result<()> {
        use std::io::Write as _;

        for path in self.data_files() {
            ensure!(
                !path.exists(),
                "store file '{}' already exists; refusing to reinitialize",
                path.display()
            );
        }

        for path in self.data_files() {
            let mut file = std::fs::File::create(path)
                .wrap_err_with(|| format!("failed to create '{}'", path.display()))?;
            file.write_all(b"X")
                .wrap_err_with(|| format!("failed to seed '{}'", path.display()))?;
        }
        Ok(())
    }
}
