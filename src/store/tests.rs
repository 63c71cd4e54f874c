//! Store-level tests: lifecycle, the push/pop inverse law, gap queries,
//! the read retry protocol and interprocess exclusivity, driven through
//! synthetic blocks.

use std::sync::Arc;

use tempfile::tempdir;

use crate::chain::block::VERSION_POW;
use crate::chain::{
    sha256, short_hash, AssetDetail, AssetTransfer, Attachment, Block, BlockHeader, Hash256,
    Identity, Input, OutPoint, Output, PointKind, Script, ShortHash, Transaction,
};
use crate::store::{ChainStore, Settings, StorePaths};

fn settings(dir: &std::path::Path) -> Settings {
    Settings::minimal(dir)
}

fn new_store(dir: &std::path::Path) -> ChainStore {
    let settings = settings(dir);
    StorePaths::new(&settings.directory).touch_all().unwrap();
    let store = ChainStore::new(&settings);
    store.create().unwrap();
    store
}

fn addr(seed: &[u8]) -> ShortHash {
    short_hash(seed)
}

fn coinbase(pay_to: &ShortHash, value: u64, tag: u32) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![Input {
            previous_output: OutPoint::NULL,
            // The tag makes each coinbase, and so each block, unique.
            script: Script::new(tag.to_le_bytes().to_vec()),
            sequence: u32::MAX,
        }],
        outputs: vec![Output {
            value,
            script: Script::pay_to_address(pay_to),
            attachment: Attachment::Value,
        }],
        lock_time: 0,
    }
}

fn block_with(transactions: Vec<Transaction>, previous: Hash256, nonce: u32) -> Block {
    Block {
        header: BlockHeader {
            version: VERSION_POW,
            previous,
            merkle: sha256(&nonce.to_le_bytes()),
            timestamp: 1_500_000_000 + nonce,
            bits: 0x1D00_FFFF,
            nonce,
        },
        signature: None,
        transactions,
    }
}

fn asset_detail() -> AssetDetail {
    AssetDetail {
        symbol: "MVS.GOLD".into(),
        max_supply: 1_000_000,
        decimals: 8,
        issuer: "carol".into(),
        address: "addr-carol".into(),
        description: "test issuance".into(),
    }
}

/// Genesis paying `addr_a` 100, then a second block whose transaction
/// spends that output into an asset issuance, a transfer, and a stealth
/// payment.
fn rich_chain(addr_a: &ShortHash) -> (Block, Block) {
    let genesis = block_with(vec![coinbase(addr_a, 100, 0)], Hash256::ZERO, 0);
    let genesis_coinbase = OutPoint::new(genesis.transactions[0].hash(), 0);

    let spender = Transaction {
        version: 1,
        inputs: vec![Input {
            previous_output: genesis_coinbase,
            script: Script::pay_to_address(addr_a),
            sequence: u32::MAX,
        }],
        outputs: vec![
            Output {
                value: 60,
                script: Script::pay_to_address(&addr(b"carol")),
                attachment: Attachment::AssetIssue(asset_detail()),
            },
            Output {
                value: 40,
                script: Script::pay_to_address(addr_a),
                attachment: Attachment::AssetTransfer(AssetTransfer {
                    symbol: "MVS.GOLD".into(),
                    quantity: 5,
                }),
            },
            Output {
                value: 0,
                script: Script::stealth_announce(&sha256(b"ephemeral"), 0xFEED),
                attachment: Attachment::Value,
            },
            Output {
                value: 7,
                script: Script::pay_to_address(&addr(b"dora")),
                attachment: Attachment::Value,
            },
        ],
        lock_time: 0,
    };

    let second = block_with(
        vec![coinbase(&addr(b"miner"), 50, 1), spender],
        genesis.hash(),
        1,
    );
    (genesis, second)
}

#[test]
fn concrete_scenario_push_query_pop() {
    let dir = tempdir().unwrap();
    let store = new_store(dir.path());
    let addr_a = addr(b"address-a");

    let genesis = block_with(vec![coinbase(&addr_a, 100, 0)], Hash256::ZERO, 0);
    store.push(&genesis, 0).unwrap();

    assert_eq!(store.block_height(&genesis.hash()).unwrap(), Some(0));

    let history = store.address_history(&addr_a, 0, 0).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, PointKind::Output);
    assert_eq!(history[0].value_or_checksum, 100);

    let unspent = store.address_business_history(&addr_a).unwrap();
    assert_eq!(unspent.len(), 1);
    assert!(!unspent[0].is_spent());
    assert_eq!(unspent[0].value, 100);

    let popped = store.pop().unwrap();
    assert_eq!(popped, genesis);

    assert!(store.address_history(&addr_a, 0, 0).unwrap().is_empty());
    assert_eq!(store.gap_range().unwrap(), None);
    assert_eq!(store.top_height(), None);

    store.stop().unwrap();
    store.close().unwrap();
}

#[test]
fn push_pop_inverse_restores_every_index() {
    let dir = tempdir().unwrap();
    let store = new_store(dir.path());
    let addr_a = addr(b"address-a");
    let (genesis, second) = rich_chain(&addr_a);

    store.push(&genesis, 0).unwrap();

    let history_before = store.address_history(&addr_a, 0, 0).unwrap();
    let genesis_coinbase = OutPoint::new(genesis.transactions[0].hash(), 0);

    store.push(&second, 1).unwrap();

    // The second block landed everywhere it should.
    assert_eq!(store.top_height(), Some(1));
    assert!(store.spends.get(&genesis_coinbase).unwrap().is_some());
    assert_eq!(
        store.assets.get_by_symbol("MVS.GOLD").unwrap(),
        Some(asset_detail())
    );
    assert_eq!(store.stealth_rows(0xFEED, 0).unwrap().len(), 1);
    assert_eq!(store.address_history(&addr_a, 0, 0).unwrap().len(), 3);
    assert!(!store
        .business_records(&addr(b"carol"), 0, 0)
        .unwrap()
        .is_empty());

    let joined = store.address_business_history(&addr_a).unwrap();
    let spent: Vec<_> = joined.iter().filter(|entry| entry.is_spent()).collect();
    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].value, 100);
    assert_eq!(spent[0].spend_height, 1);

    // Pop returns the block bit-identically and unwinds every index.
    let popped = store.pop().unwrap();
    assert_eq!(popped, second);

    assert_eq!(store.top_height(), Some(0));
    assert!(store.spends.get(&genesis_coinbase).unwrap().is_none());
    assert_eq!(store.assets.get_by_symbol("MVS.GOLD").unwrap(), None);
    assert!(store.stealth_rows(0xFEED, 0).unwrap().is_empty());
    assert!(store
        .business_records(&addr(b"carol"), 0, 0)
        .unwrap()
        .is_empty());
    assert!(store
        .transaction(&second.transactions[1].hash())
        .unwrap()
        .is_none());
    assert_eq!(store.address_history(&addr_a, 0, 0).unwrap(), history_before);
}

#[test]
fn out_of_order_push_closes_gaps() {
    let dir = tempdir().unwrap();
    let store = new_store(dir.path());

    let blocks: Vec<Block> = (0..3)
        .map(|n| block_with(vec![coinbase(&addr(b"miner"), 50, n)], Hash256::ZERO, n))
        .collect();

    store.push(&blocks[0], 0).unwrap();
    store.push(&blocks[2], 2).unwrap();

    assert_eq!(store.gap_range().unwrap(), Some((1, 1)));
    assert_eq!(store.next_gap(0).unwrap(), 1);
    assert!(store.block_at_height(1).unwrap().is_none());

    store.push(&blocks[1], 1).unwrap();

    assert_eq!(store.gap_range().unwrap(), None);
    assert_eq!(store.next_gap(0).unwrap(), 3);
    assert_eq!(store.top_height(), Some(2));
}

#[test]
fn identity_and_cert_attachments_round_trip() {
    let dir = tempdir().unwrap();
    let store = new_store(dir.path());
    let holder = addr(b"holder");

    let identity = Identity {
        symbol: "alice".into(),
        address: "addr-holder".into(),
    };
    let tx = Transaction {
        version: 1,
        inputs: vec![Input {
            previous_output: OutPoint::NULL,
            script: Script::new(vec![0]),
            sequence: u32::MAX,
        }],
        outputs: vec![Output {
            value: 1,
            script: Script::pay_to_address(&holder),
            attachment: Attachment::IdentityRegister(identity.clone()),
        }],
        lock_time: 0,
    };
    let block = block_with(vec![tx], Hash256::ZERO, 0);

    store.push(&block, 0).unwrap();

    let rows = store.identities.get(&holder).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].registered);
    assert_eq!(rows[0].identity, identity);

    store.pop().unwrap();
    assert!(store.identities.get(&holder).unwrap().is_empty());
}

#[test]
fn pop_on_empty_store_is_an_error() {
    let dir = tempdir().unwrap();
    let store = new_store(dir.path());

    assert!(store.pop().is_err());
}

#[test]
fn initialize_then_restart_preserves_chain() {
    let dir = tempdir().unwrap();
    let config = settings(dir.path());
    let addr_a = addr(b"address-a");
    let genesis = block_with(vec![coinbase(&addr_a, 100, 0)], Hash256::ZERO, 0);

    ChainStore::initialize(&config, &genesis).unwrap();

    let store = ChainStore::new(&config);
    store.start().unwrap();

    assert_eq!(store.block_height(&genesis.hash()).unwrap(), Some(0));
    assert_eq!(store.address_history(&addr_a, 0, 0).unwrap().len(), 1);

    // stopped -> started is a legal restart.
    store.stop().unwrap();
    store.start().unwrap();
    assert_eq!(store.top_height(), Some(0));

    store.stop().unwrap();
    store.close().unwrap();
}

#[test]
fn second_process_cannot_share_the_directory() {
    let dir = tempdir().unwrap();
    let config = settings(dir.path());
    let genesis = block_with(vec![coinbase(&addr(b"a"), 1, 0)], Hash256::ZERO, 0);

    ChainStore::initialize(&config, &genesis).unwrap();

    let first = ChainStore::new(&config);
    first.start().unwrap();

    let second = ChainStore::new(&config);
    assert!(second.start().is_err());

    first.stop().unwrap();
}

#[test]
fn mismatched_settings_fail_to_start() {
    let dir = tempdir().unwrap();
    let config = settings(dir.path());
    let genesis = block_with(vec![coinbase(&addr(b"a"), 1, 0)], Hash256::ZERO, 0);

    ChainStore::initialize(&config, &genesis).unwrap();

    let mut reconfigured = config.clone();
    reconfigured.history_buckets = 257;
    let store = ChainStore::new(&reconfigured);
    assert!(store.start().is_err());
}

#[test]
fn readers_see_whole_blocks_never_fragments() {
    let dir = tempdir().unwrap();
    let store = Arc::new(new_store(dir.path()));
    let addr_a = addr(b"address-a");

    let writer = {
        let store = store.clone();
        let addr_a = addr_a;
        std::thread::spawn(move || {
            for n in 0..30u32 {
                let block = block_with(vec![coinbase(&addr_a, 10, n)], Hash256::ZERO, n);
                store.push(&block, n as u64).unwrap();
            }
        })
    };

    // Every validated snapshot must pair a history length with the block
    // count that produced it: one row per pushed block.
    for _ in 0..200 {
        let rows = store.address_history(&addr_a, 0, 0).unwrap();
        if let Some(newest) = rows.first() {
            assert_eq!(newest.height as usize, rows.len() - 1);
            assert!(rows.iter().all(|row| row.value_or_checksum == 10));
        }
    }

    writer.join().unwrap();
    assert_eq!(store.address_history(&addr_a, 0, 0).unwrap().len(), 30);
}
