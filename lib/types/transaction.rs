use crate::crypto::Wallet;
use crate::error::{ChainError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A value transfer between two addresses, or a coinbase reward.
///
/// The coinbase variant is encoded on the wire the way peers expect it:
/// an empty `sender` and an empty `signature`. Everything that treats
/// coinbase transactions specially goes through [`Transaction::is_coinbase`]
/// so the sentinel is checked in exactly one place.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    pub txid: String,
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub nonce: u64,
    pub timestamp: i64,
    pub signature: String,
}

impl Transaction {
    /// Build an unsigned transfer with a freshly captured timestamp.
    pub fn new(sender: &str, recipient: &str, amount: u64) -> Self {
        let mut tx = Transaction {
            txid: String::new(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            nonce: 0,
            timestamp: Utc::now().timestamp(),
            signature: String::new(),
        };
        tx.txid = tx.compute_txid();
        tx
    }

    /// Build the block-reward transaction for a miner.
    ///
    /// The txid is not derived from the payload like a normal transfer;
    /// it is the digest of `coinbase_{now}`, with the creation time at
    /// microsecond resolution so consecutively minted rewards get
    /// distinct ids.
    pub fn coinbase(recipient: &str, amount: u64) -> Self {
        let now = Utc::now();
        Transaction {
            txid: sha256::digest(format!("coinbase_{}", now.timestamp_micros())),
            sender: String::new(),
            recipient: recipient.to_string(),
            amount,
            nonce: 0,
            timestamp: now.timestamp(),
            signature: String::new(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender.is_empty()
    }

    /// The canonical signing payload: sorted-key JSON of everything
    /// except `txid` and `signature`.
    pub fn canonical_json(&self) -> String {
        json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "amount": self.amount,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
        })
        .to_string()
    }

    pub fn compute_txid(&self) -> String {
        sha256::digest(self.canonical_json())
    }

    /// Sign with the sender's wallet.
    ///
    /// Fills the nonce from the wallet's counter when still unset,
    /// recomputes the txid over the final payload, signs it, and
    /// advances the wallet counter.
    pub fn sign(&mut self, wallet: &mut Wallet) -> Result<()> {
        if wallet.address() != self.sender {
            return Err(ChainError::InvalidSigner);
        }

        if self.nonce == 0 {
            self.nonce = wallet.current_nonce();
        }

        self.txid = self.compute_txid();
        self.signature = wallet.sign(&self.txid);
        wallet.increment_nonce();
        Ok(())
    }

    /// Structural and cryptographic validity.
    ///
    /// Coinbase transactions are always valid here; whether one is
    /// allowed at all is a block-level rule.
    pub fn verify(&self) -> bool {
        if self.is_coinbase() {
            return true;
        }

        if self.recipient.is_empty() || self.amount == 0 {
            return false;
        }

        if self.txid.is_empty() || self.signature.is_empty() {
            return false;
        }

        if self.txid != self.compute_txid() {
            return false;
        }

        Wallet::verify(&self.txid, &self.signature, &self.sender)
    }

    /// Serialized size in canonical (sorted-key) JSON, all fields.
    pub fn serialized_size(&self) -> usize {
        let value = serde_json::to_value(self).expect("BUG: impossible");
        value.to_string().len()
    }
}
