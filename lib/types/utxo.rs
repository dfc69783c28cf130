use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One spendable (or spent) credit to an address.
///
/// Spent entries stay in the map as tombstones: rebuilding the set from
/// the chain walks every historical transaction, and keeping the spent
/// keys around makes two rebuilds of the same chain produce identical
/// maps.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UtxoEntry {
    pub address: String,
    pub amount: u64,
    pub spent: bool,
}

/// An unspent entry as handed to selection and API callers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UtxoRef {
    pub key: String,
    pub amount: u64,
}

/// Aggregate numbers for the status surfaces.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UtxoStats {
    pub total_utxos: usize,
    pub spent_utxos: usize,
    pub unspent_utxos: usize,
    pub unique_addresses: usize,
    pub total_supply: u64,
}

/// The map of transaction outputs, keyed by txid (recipient output)
/// or `"{txid}_change"` (change output).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct UtxoSet {
    utxos: HashMap<String, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet::default()
    }

    pub fn add(&mut self, key: &str, address: &str, amount: u64) {
        self.utxos.insert(
            key.to_string(),
            UtxoEntry {
                address: address.to_string(),
                amount,
                spent: false,
            },
        );
    }

    /// Mark an entry spent. Returns false for unknown keys.
    pub fn spend(&mut self, key: &str) -> bool {
        match self.utxos.get_mut(key) {
            Some(entry) => {
                entry.spent = true;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&UtxoEntry> {
        self.utxos.get(key)
    }

    /// Sum of unspent amounts credited to an address.
    pub fn balance(&self, address: &str) -> u64 {
        self.utxos
            .values()
            .filter(|entry| entry.address == address && !entry.spent)
            .map(|entry| entry.amount)
            .sum()
    }

    /// All unspent entries for an address, sorted ascending by amount
    /// (key as tie-break, so iteration order of the underlying map
    /// never leaks into spending decisions).
    pub fn utxos_for(&self, address: &str) -> Vec<UtxoRef> {
        let mut refs: Vec<UtxoRef> = self
            .utxos
            .iter()
            .filter(|(_, entry)| entry.address == address && !entry.spent)
            .map(|(key, entry)| UtxoRef {
                key: key.clone(),
                amount: entry.amount,
            })
            .collect();
        refs.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| a.key.cmp(&b.key)));
        refs
    }

    /// Pick entries to cover `amount`, smallest first. Returns the
    /// selection and its total, or None when the address cannot cover
    /// the amount.
    pub fn select_for_payment(&self, address: &str, amount: u64) -> Option<(Vec<UtxoRef>, u64)> {
        let mut selected = vec![];
        let mut total = 0u64;

        for utxo in self.utxos_for(address) {
            if total >= amount {
                break;
            }
            total += utxo.amount;
            selected.push(utxo);
        }

        if total < amount {
            return None;
        }
        Some((selected, total))
    }

    pub fn total_supply(&self) -> u64 {
        self.utxos
            .values()
            .filter(|entry| !entry.spent)
            .map(|entry| entry.amount)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn stats(&self) -> UtxoStats {
        let spent = self.utxos.values().filter(|entry| entry.spent).count();
        let addresses: HashSet<&str> = self
            .utxos
            .values()
            .map(|entry| entry.address.as_str())
            .collect();
        UtxoStats {
            total_utxos: self.utxos.len(),
            spent_utxos: spent,
            unspent_utxos: self.utxos.len() - spent,
            unique_addresses: addresses.len(),
            total_supply: self.total_supply(),
        }
    }
}
