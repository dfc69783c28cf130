//! Integration Tests for the Chain Engine
//!
//! ## 🎓 For New Team Members: Key Concepts
//!
//! If you're new to blockchain, here are the key terms you need to understand:
//!
//! **What is a Genesis Block?**
//! - The **very first block** in the blockchain (Block #0)
//! - Special: has no "previous block" (previous_hash = "0")
//! - Here it carries no transactions; the first spendable coins come
//!   from the coinbase of the first mined block
//!
//! **What is a Coinbase Transaction?**
//! - The single reward-creating transaction in each mined block
//! - Has NO sender (empty address) and no signature
//! - Credits the miner with the block reward
//!
//! **What is a UTXO?** (Unspent Transaction Output)
//! - Think of it as a "bill" credited to an address
//! - Spending consumes whole bills and mints change back to the sender
//! - Spent bills are kept as tombstones so rebuilds are deterministic
//!
//! **What is Proof of Work?**
//! - Scan nonces until the block hash starts with `difficulty` zeros
//! - Every fifth block the difficulty adjusts to chase a 10-second
//!   block time
//!
//! ### Test Strategy
//!
//! - **In-Memory Operations**: Tests run without network or file I/O
//! - **Full Workflow Verification**: genesis → mine → transfer → fork
//!   resolution, asserted end to end on the UTXO set
//! - **State Consistency**: rebuilds and restores must reproduce the
//!   exact same state
//!
//! ## 🚧 What We're NOT Testing Here (And Why)
//!
//! The node crate's HTTP API, gossip overlay, health checks, and mining
//! loop are network-dependent and async-heavy; their pure parts are
//! unit-tested in the node crate and the rest is exercised by running
//! real nodes against each other.

use chainlib::config;
use chainlib::crypto::Wallet;
use chainlib::error::ChainError;
use chainlib::store::{ChainSnapshot, ChainStore, MemoryStore};
use chainlib::types::{proof_of_work, Block, Chain, Mempool, Transaction};

/// Helper: sign a transfer from `wallet`.
fn signed_transfer(wallet: &mut Wallet, recipient: &str, amount: u64) -> Transaction {
    let mut tx = Transaction::new(&wallet.address(), recipient, amount);
    tx.sign(wallet).expect("wallet owns the sender address");
    tx
}

/// Helper: assemble and mine the next block on top of the chain tip.
fn mined_block(chain: &Chain, transactions: Vec<Transaction>) -> Block {
    let mut block = chain.next_block_template(transactions);
    proof_of_work(&mut block, chain.difficulty());
    block
}

/// Helper: a chain whose miner wallet holds one spendable coinbase.
fn chain_with_funds(miner: &Wallet) -> Chain {
    let mut chain = Chain::new();
    chain.create_genesis().expect("fresh chain");
    chain
        .mine(&miner.address(), vec![])
        .expect("reward block is valid");
    chain
}

/// Scenario: starting from nothing, create the genesis block.
///
/// The chain must hold exactly one block with index 0, previous hash
/// "0", no transactions, and a hash that satisfies the initial
/// difficulty of two leading zeros.
#[test]
fn test_genesis_from_empty_store() {
    let mut chain = Chain::new();
    let genesis = chain.create_genesis().unwrap();

    assert_eq!(chain.height(), 1);
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.previous_hash, "0");
    assert!(genesis.transactions.is_empty());
    assert!(genesis.hash.starts_with("00"));
    assert!(chain.utxo_set().is_empty());
}

/// Scenario: a wallet mines an empty (coinbase-only) block after
/// genesis through the engine's mining path and is credited the full
/// reward.
#[test]
fn test_mining_reward_flow() {
    let miner = Wallet::generate();
    let mut chain = Chain::new();
    chain.create_genesis().unwrap();

    let block = chain.mine(&miner.address(), vec![]).unwrap();

    assert_eq!(block.index, 1);
    assert!(block.transactions[0].is_coinbase());
    assert_eq!(chain.height(), 2);
    assert_eq!(chain.balance(&miner.address()), 50);
}

/// Scenario: a transfer that needs change.
///
/// Alice holds a single 50-coin output and sends 30 to Bob. After the
/// block applies, Bob holds 30, Alice holds 20 in a change output, and
/// the original 50-coin output is tombstoned.
#[test]
fn test_transfer_with_change_flow() {
    let mut alice = Wallet::generate();
    let bob = Wallet::generate();
    let miner = Wallet::generate();
    let mut chain = chain_with_funds(&alice);

    let tx = signed_transfer(&mut alice, &bob.address(), 30);
    let txid = tx.txid.clone();

    let coinbase = Transaction::coinbase(&miner.address(), config::coinbase_reward());
    let block = mined_block(&chain, vec![coinbase, tx]);
    chain.add_block(block).unwrap();

    assert_eq!(chain.balance(&bob.address()), 30);
    assert_eq!(chain.balance(&alice.address()), 20);

    let recipient = chain.utxo_set().get(&txid).unwrap();
    assert_eq!((recipient.address.as_str(), recipient.amount), (bob.address().as_str(), 30));

    let change = chain.utxo_set().get(&format!("{txid}_change")).unwrap();
    assert_eq!((change.address.as_str(), change.amount), (alice.address().as_str(), 20));

    assert_eq!(chain.utxo_set().stats().spent_utxos, 1);
}

/// Scenario: over-spending is refused at admission and the mempool is
/// left untouched.
#[test]
fn test_insufficient_balance_rejected_at_admission() {
    let mut alice = Wallet::generate();
    let chain = chain_with_funds(&alice);
    let mempool = Mempool::new();

    // Alice holds 50 and tries to send 80
    let tx = signed_transfer(&mut alice, "bob", 80);

    let result = chain.validate_transaction(&tx);
    assert!(matches!(
        result,
        Err(ChainError::InsufficientBalance {
            needed: 80,
            available: 50
        })
    ));

    // Admission never reached the pool
    assert_eq!(mempool.size(), 0);
}

/// Scenario: longest-valid-chain replacement.
///
/// A node with a short chain adopts a longer valid chain that shares
/// its genesis, and its rebuilt UTXO set matches the donor's exactly.
#[test]
fn test_longest_chain_replacement() {
    let miner_x = Wallet::generate();
    let miner_y = Wallet::generate();

    let mut node_x = Chain::new();
    node_x.create_genesis().unwrap();
    let mut node_y = Chain::restore(node_x.blocks().to_vec());

    // X mines 3 more blocks (4 total), Y mines 5 more (6 total)
    for _ in 0..3 {
        let coinbase = Transaction::coinbase(&miner_x.address(), config::coinbase_reward());
        let block = mined_block(&node_x, vec![coinbase]);
        node_x.add_block(block).unwrap();
    }
    for _ in 0..5 {
        let coinbase = Transaction::coinbase(&miner_y.address(), config::coinbase_reward());
        let block = mined_block(&node_y, vec![coinbase]);
        node_y.add_block(block).unwrap();
    }

    assert_eq!(node_x.height(), 4);
    assert_eq!(node_y.height(), 6);

    node_x.replace_chain(node_y.blocks().to_vec()).unwrap();

    assert_eq!(node_x.height(), 6);
    assert_eq!(node_x.blocks(), node_y.blocks());
    assert_eq!(node_x.utxo_set(), node_y.utxo_set());
    assert_eq!(node_x.balance(&miner_x.address()), 0);
    assert_eq!(node_x.balance(&miner_y.address()), 250);
}

/// Round-trip law: a block survives serialize → deserialize with
/// structural equality and the same hash.
#[test]
fn test_block_serde_round_trip() {
    let mut alice = Wallet::generate();
    let mut chain = chain_with_funds(&alice);

    let tx = signed_transfer(&mut alice, "bob", 10);
    let coinbase = Transaction::coinbase("miner", config::coinbase_reward());
    let block = mined_block(&chain, vec![coinbase, tx]);
    chain.add_block(block.clone()).unwrap();

    let encoded = serde_json::to_string(&block).unwrap();
    let decoded: Block = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded, block);
    assert_eq!(decoded.compute_hash(), block.hash);
}

/// Round-trip law: rebuilding the UTXO set from the chain twice gives
/// identical snapshots.
#[test]
fn test_utxo_rebuild_determinism() {
    let mut alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut chain = chain_with_funds(&alice);

    let tx = signed_transfer(&mut alice, &bob.address(), 12);
    let coinbase = Transaction::coinbase("miner", config::coinbase_reward());
    let block = mined_block(&chain, vec![coinbase, tx]);
    chain.add_block(block).unwrap();

    chain.rebuild_utxo_set();
    let first = chain.utxo_set().clone();
    chain.rebuild_utxo_set();

    assert_eq!(*chain.utxo_set(), first);
}

/// Round-trip law: sign-then-verify holds, and flipping any signed
/// field (even with a recomputed txid) breaks verification.
#[test]
fn test_signature_round_trip_and_tampering() {
    let mut alice = Wallet::generate();
    let tx = signed_transfer(&mut alice, "bob", 10);
    assert!(tx.verify());

    let mut tampered = tx.clone();
    tampered.recipient = "carol".to_string();
    tampered.txid = tampered.compute_txid();
    assert!(!tampered.verify());

    let mut tampered = tx.clone();
    tampered.amount = 11;
    tampered.txid = tampered.compute_txid();
    assert!(!tampered.verify());

    let mut tampered = tx;
    tampered.nonce += 1;
    tampered.txid = tampered.compute_txid();
    assert!(!tampered.verify());
}

/// Persistence flow: snapshot through a store and restore an identical
/// chain, difficulty included.
#[test]
fn test_snapshot_store_round_trip() {
    let mut alice = Wallet::generate();
    let mut chain = chain_with_funds(&alice);

    let tx = signed_transfer(&mut alice, "bob", 5);
    let coinbase = Transaction::coinbase("miner", config::coinbase_reward());
    let block = mined_block(&chain, vec![coinbase, tx]);
    chain.add_block(block).unwrap();

    let store = MemoryStore::new();
    store.save(&chain.snapshot()).unwrap();

    let loaded: ChainSnapshot = store.load().unwrap().expect("snapshot was saved");
    let restored = Chain::restore(loaded.chain);

    assert_eq!(restored.blocks(), chain.blocks());
    assert_eq!(restored.utxo_set(), chain.utxo_set());
    assert_eq!(restored.difficulty(), chain.difficulty());
}

/// The mining-path contract: a bundle that fails validation leaves the
/// chain untouched so the caller can re-admit the transactions.
#[test]
fn test_invalid_bundle_leaves_chain_unchanged() {
    let mut alice = Wallet::generate();
    let mut chain = chain_with_funds(&alice);
    let height_before = chain.height();

    // Over-spend: alice holds 50, the bundle moves 90
    let first = signed_transfer(&mut alice, "bob", 45);
    let second = signed_transfer(&mut alice, "carol", 45);
    let coinbase = Transaction::coinbase("miner", config::coinbase_reward());
    let block = mined_block(&chain, vec![coinbase, first, second]);

    assert!(chain.add_block(block).is_err());
    assert_eq!(chain.height(), height_before);
    assert_eq!(chain.balance(&alice.address()), 50);
}
