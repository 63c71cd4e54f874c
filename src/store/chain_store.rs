//! # Chain Store
//!
//! The table set and its push/pop protocol. One `ChainStore` owns every
//! table, the sequential lock serializing writers against readers, the
//! shared remap gate, and the interprocess lock.
//!
//! ## Lifecycle
//!
//! `closed -> created -> started -> stopped -> closed`. `create()` is
//! first-run initialization of a fresh directory; `start()` acquires the
//! process lock and opens everything; `stop()` quiesces and releases the
//! lock; `close()` unmaps. `stopped -> started` is a legal restart.
//! Closing while other threads hold in-flight reads is undefined - the
//! surrounding node joins its workers first.
//!
//! ## Push
//!
//! `push(block, height)` runs entirely inside one writer critical
//! section: per transaction it records spends and address history for
//! inputs, unspent history and attachment rows for outputs, stealth rows
//! for announcement pairs, and the transaction itself; then the block
//! record and its height-index entry. Readers see all of it or none of
//! it.
//!
//! ## Pop
//!
//! `pop()` is the exact inverse, applied in reverse order. There is no
//! undo log: correctness relies on reversing the same sequence of index
//! mutations push performed, which is why every multimap removal is the
//! LIFO `delete_last_row` (or its content-matched variant for the
//! deduplicated indices).

use eyre::{bail, ensure, Result};
use tracing::debug;

use crate::chain::{
    Attachment, Block, BusinessHistory, BusinessRecord, Hash256, HistoryEntry, Input, OutPoint,
    Output, PointKind, ShortHash, StealthRow, Transaction,
};
use crate::memory::RemapGate;
use crate::tables::{
    AccountAddressTable, AccountAssetTable, AccountTable, AddressAssetTable, AssetTable,
    BlockResult, BlockTable, CertTable, HistoryTable, IdentityTable, SpendTable, StealthTable,
    TransactionTable,
};

use super::paths::StorePaths;
use super::process_lock::ProcessLock;
use super::sequential_lock::{ReadHandle, SequentialLock};
use super::settings::Settings;

pub struct ChainStore {
    settings: Settings,
    lock: SequentialLock,
    process_lock: ProcessLock,

    pub blocks: BlockTable,
    pub transactions: TransactionTable,
    pub spends: SpendTable,
    pub history: HistoryTable,
    pub stealth: StealthTable,
    pub accounts: AccountTable,
    pub account_addresses: AccountAddressTable,
    pub assets: AssetTable,
    pub address_assets: AddressAssetTable,
    pub account_assets: AccountAssetTable,
    pub certs: CertTable,
    pub identities: IdentityTable,
}

impl ChainStore {
    pub fn new(settings: &Settings) -> Self {
        let paths = StorePaths::new(&settings.directory);
        let gate = RemapGate::default();

        Self {
            blocks: BlockTable::new(
                &paths.blocks_lookup,
                &paths.blocks_index,
                gate.clone(),
                settings.block_buckets,
            ),
            transactions: TransactionTable::new(
                &paths.transactions_lookup,
                gate.clone(),
                settings.transaction_buckets,
            ),
            spends: SpendTable::new(&paths.spends_lookup, gate.clone(), settings.spend_buckets),
            history: HistoryTable::new(
                &paths.history_lookup,
                &paths.history_rows,
                gate.clone(),
                settings.history_buckets,
            ),
            stealth: StealthTable::new(
                &paths.stealth_lookup,
                &paths.stealth_rows,
                gate.clone(),
                settings.stealth_buckets,
            ),
            accounts: AccountTable::new(
                &paths.accounts_lookup,
                gate.clone(),
                settings.registry_buckets,
            ),
            account_addresses: AccountAddressTable::new(
                &paths.account_addresses_lookup,
                &paths.account_addresses_rows,
                gate.clone(),
                settings.registry_buckets,
            ),
            assets: AssetTable::new(&paths.assets_lookup, gate.clone(), settings.registry_buckets),
            address_assets: AddressAssetTable::new(
                &paths.address_assets_lookup,
                &paths.address_assets_rows,
                gate.clone(),
                settings.registry_buckets,
            ),
            account_assets: AccountAssetTable::new(
                &paths.account_assets_lookup,
                &paths.account_assets_rows,
                gate.clone(),
                settings.registry_buckets,
            ),
            certs: CertTable::new(
                &paths.certs_lookup,
                &paths.certs_rows,
                gate.clone(),
                settings.registry_buckets,
            ),
            identities: IdentityTable::new(
                &paths.identities_lookup,
                &paths.identities_rows,
                gate,
                settings.registry_buckets,
            ),
            process_lock: ProcessLock::new(&paths.store_lock),
            lock: SequentialLock::new(),
            settings: settings.clone(),
        }
    }

    /// First-run convenience: seed a fresh directory, create every table
    /// and commit the genesis block at height zero.
    pub fn initialize(settings: &Settings, genesis: &Block) -> Result<()> {
        std::fs::create_dir_all(&settings.directory)?;
        StorePaths::new(&settings.directory).touch_all()?;

        let store = Self::new(settings);
        store.create()?;
        store.push(genesis, 0)?;
        store.stop()?;
        store.close()
    }

    // Startup and shutdown.
    // ------------------------------------------------------------------

    /// First-run initialization of all tables. Call at most once per
    /// fresh store directory, after `StorePaths::touch_all`.
    pub fn create(&self) -> Result<()> {
        debug!(directory = %self.settings.directory.display(), "creating store");
        self.process_lock.start()?;

        self.blocks.create()?;
        self.transactions.create()?;
        self.spends.create()?;
        self.history.create()?;
        self.stealth.create()?;
        self.accounts.create()?;
        self.account_addresses.create()?;
        self.assets.create()?;
        self.address_assets.create()?;
        self.account_assets.create()?;
        self.certs.create()?;
        self.identities.create()
    }

    /// Open all tables; required before any read or write. Fails fast if
    /// another process holds the store directory.
    pub fn start(&self) -> Result<()> {
        debug!(directory = %self.settings.directory.display(), "starting store");
        self.process_lock.start()?;

        let _write = self.lock.begin_write();
        self.blocks.start()?;
        self.transactions.start()?;
        self.spends.start()?;
        self.history.start()?;
        self.stealth.start()?;
        self.accounts.start()?;
        self.account_addresses.start()?;
        self.assets.start()?;
        self.address_assets.start()?;
        self.account_assets.start()?;
        self.certs.start()?;
        self.identities.start()
    }

    /// Quiesce writer activity and flush; required before process exit.
    /// The store may be started again afterwards.
    pub fn stop(&self) -> Result<()> {
        let result = {
            let _write = self.lock.begin_write();
            self.blocks
                .stop()
                .and_then(|_| self.transactions.stop())
                .and_then(|_| self.spends.stop())
                .and_then(|_| self.history.stop())
                .and_then(|_| self.stealth.stop())
                .and_then(|_| self.accounts.stop())
                .and_then(|_| self.account_addresses.stop())
                .and_then(|_| self.assets.stop())
                .and_then(|_| self.address_assets.stop())
                .and_then(|_| self.account_assets.stop())
                .and_then(|_| self.certs.stop())
                .and_then(|_| self.identities.stop())
        };

        self.process_lock.stop()?;
        result
    }

    /// Unmap every file. Must not be called while other threads hold
    /// in-flight handles; the caller joins its workers first.
    pub fn close(&self) -> Result<()> {
        self.blocks.close()?;
        self.transactions.close()?;
        self.spends.close()?;
        self.history.close()?;
        self.stealth.close()?;
        self.accounts.close()?;
        self.account_addresses.close()?;
        self.assets.close()?;
        self.address_assets.close()?;
        self.account_assets.close()?;
        self.certs.close()?;
        self.identities.close()
    }

    // Locking.
    // ------------------------------------------------------------------

    pub fn begin_read(&self) -> ReadHandle {
        self.lock.begin_read()
    }

    pub fn is_read_valid(&self, handle: ReadHandle) -> bool {
        self.lock.is_read_valid(handle)
    }

    pub fn is_write_locked(handle: ReadHandle) -> bool {
        SequentialLock::is_write_locked(handle)
    }

    // Push and pop.
    // ------------------------------------------------------------------

    /// Commit `block` at the next height after the current top.
    pub fn push_next(&self, block: &Block) -> Result<()> {
        let height = self.blocks.top().map_or(0, |top| top + 1);
        self.push(block, height)
    }

    /// Commit `block` at `height`, updating every table inside one writer
    /// critical section. No duplicate protection: pushing the same block
    /// twice at two heights is a caller error.
    pub fn push(&self, block: &Block, height: u64) -> Result<()> {
        ensure!(height < u32::MAX as u64, "height {} out of range", height);
        let height32 = height as u32;

        let _write = self.lock.begin_write();

        for (index, tx) in block.transactions.iter().enumerate() {
            let tx_hash = tx.hash();

            if !tx.is_coinbase() {
                self.push_inputs(&tx_hash, height32, &tx.inputs)?;
            }
            self.push_outputs(&tx_hash, height32, &tx.outputs)?;
            self.push_stealth(&tx_hash, height32, &tx.outputs)?;
            self.transactions.store(height, index, tx)?;
        }

        self.blocks.store(block, height)?;
        self.synchronize()
    }

    /// Roll the top block back out of every table and return it.
    /// The exact inverse of `push`, applied in reverse order.
    pub fn pop(&self) -> Result<Block> {
        let _write = self.lock.begin_write();

        let Some(height) = self.blocks.top() else {
            bail!("pop on an empty store");
        };
        let Some(record) = self.blocks.get(height)? else {
            bail!("pop at height {} which is an unwritten gap", height);
        };
        let height32 = record.height;

        let transactions = self.read_block_transactions(&record)?;

        // Reverse of the push order: per transaction (newest first),
        // remove the transaction, then stealth, then outputs, then inputs.
        for (index, tx) in transactions.iter().enumerate().rev() {
            self.transactions.remove(&record.transaction_hashes[index])?;
            self.pop_stealth(height32, &tx.outputs)?;
            self.pop_outputs(&record.transaction_hashes[index], height32, &tx.outputs)?;
            if !tx.is_coinbase() {
                self.pop_inputs(&record.transaction_hashes[index], height32, &tx.inputs)?;
            }
        }

        self.blocks.remove(&record.header.hash())?;
        self.blocks.unlink(height);
        self.synchronize()?;

        Ok(Block {
            header: record.header,
            signature: record.signature,
            transactions,
        })
    }

    // Queries (internally validated by the sequential lock).
    // ------------------------------------------------------------------

    pub fn block_at_height(&self, height: u64) -> Result<Option<BlockResult>> {
        self.lock.read_consistent(|| self.blocks.get(height))
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Result<Option<BlockResult>> {
        self.lock.read_consistent(|| self.blocks.get_by_hash(hash))
    }

    pub fn block_height(&self, hash: &Hash256) -> Result<Option<u64>> {
        self.lock.read_consistent(|| self.blocks.height_of(hash))
    }

    pub fn top_height(&self) -> Option<u64> {
        self.lock.read_consistent(|| self.blocks.top())
    }

    pub fn gap_range(&self) -> Result<Option<(u64, u64)>> {
        self.lock.read_consistent(|| self.blocks.gap_range())
    }

    pub fn next_gap(&self, start: u64) -> Result<u64> {
        self.lock.read_consistent(|| self.blocks.next_gap(start))
    }

    pub fn transaction(&self, hash: &Hash256) -> Result<Option<Transaction>> {
        self.lock.read_consistent(|| {
            Ok(self
                .transactions
                .get(hash)?
                .map(|result| result.transaction))
        })
    }

    pub fn address_history(
        &self,
        address: &ShortHash,
        limit: usize,
        from_height: u32,
    ) -> Result<Vec<HistoryEntry>> {
        self.lock
            .read_consistent(|| self.history.get(address, limit, from_height))
    }

    /// Joined unspent/spent view of an address: every received output,
    /// annotated with the input that spent it where one exists. Spends
    /// are matched to outputs through the point checksum carried by
    /// spend rows.
    pub fn address_business_history(&self, address: &ShortHash) -> Result<Vec<BusinessHistory>> {
        self.lock.read_consistent(|| {
            let rows = self.history.get(address, 0, 0)?;

            let mut spent: hashbrown::HashMap<u64, (OutPoint, u32)> = hashbrown::HashMap::new();
            for row in rows.iter().filter(|row| row.kind == PointKind::Spend) {
                spent.insert(row.value_or_checksum, (row.point, row.height));
            }

            let mut history = Vec::new();
            for row in rows.iter().filter(|row| row.kind == PointKind::Output) {
                let mut entry = BusinessHistory {
                    output: row.point,
                    output_height: row.height,
                    value: row.value_or_checksum,
                    spend: OutPoint::NULL,
                    spend_height: BusinessHistory::UNSPENT_HEIGHT,
                };
                if let Some((spender, height)) = spent.get(&row.point.checksum()) {
                    entry.spend = *spender;
                    entry.spend_height = *height;
                }
                history.push(entry);
            }
            Ok(history)
        })
    }

    pub fn business_records(
        &self,
        address: &ShortHash,
        limit: usize,
        from_height: u32,
    ) -> Result<Vec<BusinessRecord>> {
        self.lock
            .read_consistent(|| self.address_assets.get(address, limit, from_height))
    }

    pub fn stealth_rows(&self, prefix: u32, from_height: u32) -> Result<Vec<StealthRow>> {
        self.lock
            .read_consistent(|| self.stealth.get(prefix, from_height))
    }

    // Push internals.
    // ------------------------------------------------------------------

    fn push_inputs(&self, tx_hash: &Hash256, height: u32, inputs: &[Input]) -> Result<()> {
        for (index, input) in inputs.iter().enumerate() {
            let point = OutPoint::new(*tx_hash, index as u32);
            self.spends.store(&input.previous_output, &point)?;

            if height < self.settings.history_start_height {
                continue;
            }
            if let Some(address) = input.script.payment_address() {
                self.history
                    .add_input(&address, &point, height, &input.previous_output)?;
                self.address_assets
                    .store_input(&address, &point, height, &input.previous_output)?;
            }
        }
        Ok(())
    }

    fn push_outputs(&self, tx_hash: &Hash256, height: u32, outputs: &[Output]) -> Result<()> {
        if height < self.settings.history_start_height {
            return Ok(());
        }

        for (index, output) in outputs.iter().enumerate() {
            let point = OutPoint::new(*tx_hash, index as u32);
            let Some(address) = output.script.payment_address() else {
                continue;
            };

            self.history
                .add_output(&address, &point, height, output.value)?;
            self.push_attachment(&output.attachment, &address, &point, height, output.value)?;
        }
        Ok(())
    }

    /// Dispatch an output's attachment to its secondary indices. Every
    /// addressed output gets a business row; asset issues, certificates
    /// and identities additionally hit their registries.
    fn push_attachment(
        &self,
        attachment: &Attachment,
        address: &ShortHash,
        point: &OutPoint,
        height: u32,
        value: u64,
    ) -> Result<()> {
        match attachment {
            Attachment::Value
            | Attachment::AssetTransfer(_)
            | Attachment::Message(_)
            | Attachment::SubsidyAward(_) => {}
            Attachment::AssetIssue(detail) => {
                self.assets.store(detail)?;
            }
            Attachment::AssetCert(cert) => {
                self.certs.store(address, height, cert)?;
            }
            Attachment::IdentityRegister(identity) => {
                self.identities.store(address, true, height, identity)?;
            }
            Attachment::IdentityTransfer(identity) => {
                self.identities.store(address, false, height, identity)?;
            }
        }

        self.address_assets
            .store_output(address, point, height, value, attachment)?;
        Ok(())
    }

    fn push_stealth(&self, tx_hash: &Hash256, height: u32, outputs: &[Output]) -> Result<()> {
        if height < self.settings.stealth_start_height || outputs.len() < 2 {
            return Ok(());
        }

        // Announcement and payment are adjacent outputs by convention.
        for index in 0..outputs.len() - 1 {
            let Some((ephemeral_key, prefix)) = outputs[index].script.stealth_announcement()
            else {
                continue;
            };
            let Some(address) = outputs[index + 1].script.payment_address() else {
                continue;
            };

            self.stealth.store(
                prefix,
                &StealthRow {
                    height,
                    ephemeral_key,
                    address,
                    transaction_hash: *tx_hash,
                },
            )?;
        }
        Ok(())
    }

    // Pop internals.
    // ------------------------------------------------------------------

    fn read_block_transactions(&self, record: &BlockResult) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::with_capacity(record.transaction_hashes.len());
        for hash in &record.transaction_hashes {
            let Some(result) = self.transactions.get(hash)? else {
                bail!("block at height {} references missing transaction {}", record.height, hash);
            };
            ensure!(
                result.height == record.height,
                "transaction {} stored at height {}, expected {}",
                hash,
                result.height,
                record.height
            );
            transactions.push(result.transaction);
        }
        Ok(transactions)
    }

    fn pop_inputs(&self, tx_hash: &Hash256, height: u32, inputs: &[Input]) -> Result<()> {
        for (index, input) in inputs.iter().enumerate().rev() {
            self.spends.remove(&input.previous_output)?;

            if height < self.settings.history_start_height {
                continue;
            }
            if let Some(address) = input.script.payment_address() {
                self.history.delete_last_row(&address)?;

                let spender = OutPoint::new(*tx_hash, index as u32);
                let record = BusinessRecord {
                    kind: PointKind::Spend,
                    point: spender,
                    height,
                    value_or_checksum: input.previous_output.checksum(),
                    attachment: Attachment::Value,
                };
                self.address_assets.delete_row(&address, &record)?;
            }
        }
        Ok(())
    }

    fn pop_outputs(&self, tx_hash: &Hash256, height: u32, outputs: &[Output]) -> Result<()> {
        if height < self.settings.history_start_height {
            return Ok(());
        }

        for (index, output) in outputs.iter().enumerate().rev() {
            let point = OutPoint::new(*tx_hash, index as u32);
            let Some(address) = output.script.payment_address() else {
                continue;
            };

            self.pop_attachment(&output.attachment, &address, &point, height, output.value)?;
            self.history.delete_last_row(&address)?;
        }
        Ok(())
    }

    fn pop_attachment(
        &self,
        attachment: &Attachment,
        address: &ShortHash,
        point: &OutPoint,
        height: u32,
        value: u64,
    ) -> Result<()> {
        let record = BusinessRecord {
            kind: PointKind::Output,
            point: *point,
            height,
            value_or_checksum: value,
            attachment: attachment.clone(),
        };
        self.address_assets.delete_row(address, &record)?;

        match attachment {
            Attachment::Value
            | Attachment::AssetTransfer(_)
            | Attachment::Message(_)
            | Attachment::SubsidyAward(_) => {}
            Attachment::AssetIssue(detail) => {
                self.assets.remove_if_matches(detail)?;
            }
            Attachment::AssetCert(cert) => {
                self.certs.delete_row(address, height, cert)?;
            }
            Attachment::IdentityRegister(identity) => {
                self.identities.delete_row(address, true, height, identity)?;
            }
            Attachment::IdentityTransfer(identity) => {
                self.identities.delete_row(address, false, height, identity)?;
            }
        }
        Ok(())
    }

    fn pop_stealth(&self, height: u32, outputs: &[Output]) -> Result<()> {
        if height < self.settings.stealth_start_height || outputs.len() < 2 {
            return Ok(());
        }

        for index in (0..outputs.len() - 1).rev() {
            let Some((_, prefix)) = outputs[index].script.stealth_announcement() else {
                continue;
            };
            if outputs[index + 1].script.payment_address().is_none() {
                continue;
            }
            self.stealth.delete_last_row(prefix)?;
        }
        Ok(())
    }

    /// Persist every allocator's size counters, blocks last so the height
    /// index never points past a table that has not caught up on disk.
    fn synchronize(&self) -> Result<()> {
        self.spends.sync()?;
        self.history.sync()?;
        self.stealth.sync()?;
        self.transactions.sync()?;
        self.accounts.sync()?;
        self.account_addresses.sync()?;
        self.assets.sync()?;
        self.address_assets.sync()?;
        self.account_assets.sync()?;
        self.certs.sync()?;
        self.identities.sync()?;
        self.blocks.sync()
    }
}
