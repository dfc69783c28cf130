use super::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Hash of the imaginary block before genesis.
pub const GENESIS_PREV_HASH: &str = "0";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Build a candidate block. The stored hash is the hash of the
    /// initial contents (nonce 0); proof of work overwrites it.
    pub fn new(
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        previous_hash: &str,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.to_string(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Canonical hash: SHA-256 over the sorted-key JSON of everything
    /// except the `hash` field itself.
    pub fn compute_hash(&self) -> String {
        let payload = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": serde_json::to_value(&self.transactions).expect("BUG: impossible"),
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });
        sha256::digest(payload.to_string())
    }

    /// Serialized size in canonical JSON, `hash` included.
    pub fn size(&self) -> usize {
        let value = serde_json::to_value(self).expect("BUG: impossible");
        value.to_string().len()
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        has_leading_zeros(&self.hash, difficulty)
    }
}

/// Does a hex hash start with at least `difficulty` '0' characters?
pub fn has_leading_zeros(hash: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash.len() >= required && hash.as_bytes()[..required].iter().all(|&b| b == b'0')
}
