use super::Transaction;
use crate::config;
use crate::error::{ChainError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Bounded store of pending transactions, keyed by txid.
///
/// Admission policy lives with the callers: the node validates
/// signatures and balances before calling [`Mempool::add`], so the pool
/// itself only enforces shape, uniqueness, and the size bound.
pub struct Mempool {
    transactions: Mutex<HashMap<String, Transaction>>,
    max_size: usize,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool::with_capacity(config::mempool_max())
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Mempool {
            transactions: Mutex::new(HashMap::new()),
            max_size,
        }
    }

    pub fn add(&self, tx: Transaction) -> Result<()> {
        if tx.txid.is_empty() {
            return Err(ChainError::malformed("transaction has no txid"));
        }

        let mut transactions = self.lock();
        if transactions.contains_key(&tx.txid) {
            return Err(ChainError::DuplicateTx { txid: tx.txid });
        }
        if transactions.len() >= self.max_size {
            return Err(ChainError::MempoolFull);
        }

        transactions.insert(tx.txid.clone(), tx);
        Ok(())
    }

    /// Remove and return up to `max_count` transactions, oldest first.
    ///
    /// This is the mining-path transfer out of the pool: if the block
    /// being assembled is later rejected, the caller re-admits the
    /// non-coinbase transactions.
    pub fn take(&self, max_count: usize) -> Vec<Transaction> {
        let mut transactions = self.lock();

        let mut sorted: Vec<Transaction> = transactions.values().cloned().collect();
        sorted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.txid.cmp(&b.txid))
        });
        sorted.truncate(max_count);

        for tx in &sorted {
            transactions.remove(&tx.txid);
        }
        sorted
    }

    /// Idempotent removal; returns whether the txid was present.
    pub fn remove(&self, txid: &str) -> bool {
        self.lock().remove(txid).is_some()
    }

    pub fn get(&self, txid: &str) -> Option<Transaction> {
        self.lock().get(txid).cloned()
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the pending transactions, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut snapshot: Vec<Transaction> = self.lock().values().cloned().collect();
        snapshot.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.txid.cmp(&b.txid))
        });
        snapshot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Transaction>> {
        self.transactions
            .lock()
            .expect("BUG: mempool lock poisoned")
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Mempool::new()
    }
}
