//! Shared test helper functions for unit tests
//!
//! This module provides reusable test utilities to avoid duplication
//! across test modules in the codebase.

use crate::config;
use crate::crypto::Wallet;
use crate::types::{proof_of_work, Block, Chain, Transaction};

/// Create a signed transfer from `wallet`, ready for admission.
pub fn signed_transfer(wallet: &mut Wallet, recipient: &str, amount: u64) -> Transaction {
    let mut tx = Transaction::new(&wallet.address(), recipient, amount);
    tx.sign(wallet).expect("wallet owns the sender address");
    tx
}

/// Assemble and mine a block on top of the chain tip.
pub fn mined_block(chain: &Chain, transactions: Vec<Transaction>) -> Block {
    let mut block = chain.next_block_template(transactions);
    proof_of_work(&mut block, chain.difficulty());
    block
}

/// Assemble and mine a block with a fixed timestamp, for tests that
/// steer the difficulty retarget.
pub fn mined_block_at(chain: &Chain, transactions: Vec<Transaction>, timestamp: i64) -> Block {
    let mut block = chain.next_block_template(transactions);
    block.timestamp = timestamp;
    proof_of_work(&mut block, chain.difficulty());
    block
}

/// A chain with a genesis block plus one mined reward block, so the
/// miner wallet starts with one spendable coinbase output.
pub fn chain_with_funds(miner: &Wallet) -> Chain {
    let mut chain = Chain::new();
    chain.create_genesis().expect("fresh chain");
    chain
        .mine(&miner.address(), vec![])
        .expect("reward block is valid");
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_transfer_is_valid() {
        let mut wallet = Wallet::generate();
        let tx = signed_transfer(&mut wallet, "recipient", 10);

        assert!(tx.verify());
        assert_eq!(tx.sender, wallet.address());
    }

    #[test]
    fn test_chain_with_funds_credits_miner() {
        let miner = Wallet::generate();
        let chain = chain_with_funds(&miner);

        assert_eq!(chain.height(), 2);
        assert_eq!(chain.balance(&miner.address()), config::coinbase_reward());
    }
}
