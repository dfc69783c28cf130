use anyhow::{anyhow, Context, Result};
use chainlib::crypto::{StoredWallet, Wallet};
use chainlib::error::{ChainError, Result as ChainResult};
use chainlib::types::Transaction;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

struct Inner {
    default_address: Option<String>,
    wallets: HashMap<String, Wallet>,
}

/// The node's wallets: one default wallet (the fallback miner address)
/// and a named collection, both persisted as JSON.
///
/// The default wallet file holds a single `{private_key, nonce}`
/// record; the collection file maps address to the same record.
pub struct WalletStore {
    default_path: PathBuf,
    wallets_path: PathBuf,
    inner: Mutex<Inner>,
}

impl WalletStore {
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(default_path: P, wallets_path: Q) -> Result<Self> {
        let default_path = default_path.as_ref().to_path_buf();
        let wallets_path = wallets_path.as_ref().to_path_buf();

        let mut wallets = HashMap::new();
        if wallets_path.exists() {
            let text = fs::read_to_string(&wallets_path)
                .with_context(|| format!("reading {}", wallets_path.display()))?;
            let stored: HashMap<String, StoredWallet> =
                serde_json::from_str(&text).context("parsing the wallet collection")?;
            for (address, record) in stored {
                let wallet = Wallet::from_stored(&record)
                    .map_err(|e| anyhow!("wallet {address} is corrupt: {e}"))?;
                wallets.insert(address, wallet);
            }
            info!(count = wallets.len(), "wallets loaded");
        }

        let mut default_address = None;
        if default_path.exists() {
            let text = fs::read_to_string(&default_path)
                .with_context(|| format!("reading {}", default_path.display()))?;
            let stored: StoredWallet =
                serde_json::from_str(&text).context("parsing the default wallet")?;
            let wallet =
                Wallet::from_stored(&stored).map_err(|e| anyhow!("default wallet is corrupt: {e}"))?;
            let address = wallet.address();
            info!(address = %address, "default wallet loaded");
            wallets.insert(address.clone(), wallet);
            default_address = Some(address);
        }

        Ok(WalletStore {
            default_path,
            wallets_path,
            inner: Mutex::new(Inner {
                default_address,
                wallets,
            }),
        })
    }

    /// The default wallet's address, creating and persisting the wallet
    /// on first use.
    pub fn default_address(&self) -> Result<String> {
        let mut inner = self.lock();
        if let Some(address) = &inner.default_address {
            return Ok(address.clone());
        }

        let wallet = Wallet::generate();
        let address = wallet.address();
        info!(address = %address, "default wallet created");

        inner.wallets.insert(address.clone(), wallet);
        inner.default_address = Some(address.clone());
        self.persist(&inner);
        Ok(address)
    }

    /// Create a fresh wallet in the collection and return its address.
    pub fn create_wallet(&self) -> String {
        let wallet = Wallet::generate();
        let address = wallet.address();

        let mut inner = self.lock();
        inner.wallets.insert(address.clone(), wallet);
        self.persist(&inner);

        info!(address = %address, "wallet created");
        address
    }

    /// (address, nonce) for every known wallet, sorted by address.
    pub fn list(&self) -> Vec<(String, u64)> {
        let inner = self.lock();
        let mut entries: Vec<(String, u64)> = inner
            .wallets
            .iter()
            .map(|(address, wallet)| (address.clone(), wallet.current_nonce()))
            .collect();
        entries.sort();
        entries
    }

    pub fn contains(&self, address: &str) -> bool {
        self.lock().wallets.contains_key(address)
    }

    /// Sign a transaction with the wallet owning its sender address.
    /// The wallet's nonce advances, so the store is persisted.
    pub fn sign(&self, tx: &mut Transaction) -> ChainResult<()> {
        let mut inner = self.lock();
        let sender = tx.sender.clone();
        let Some(wallet) = inner.wallets.get_mut(&sender) else {
            return Err(ChainError::InvalidSigner);
        };
        tx.sign(wallet)?;
        self.persist(&inner);
        Ok(())
    }

    fn persist(&self, inner: &Inner) {
        let stored: HashMap<&String, StoredWallet> = inner
            .wallets
            .iter()
            .map(|(address, wallet)| (address, wallet.to_stored()))
            .collect();

        // Sorted keys via the Value round trip, like the chain snapshot
        let value = serde_json::to_value(&stored).expect("BUG: impossible");
        let text = serde_json::to_string_pretty(&value).expect("BUG: impossible");
        if let Err(error) = fs::write(&self.wallets_path, text) {
            error!(%error, "failed to persist the wallet collection");
        }

        if let Some(address) = &inner.default_address {
            if let Some(wallet) = inner.wallets.get(address) {
                let text =
                    serde_json::to_string_pretty(&wallet.to_stored()).expect("BUG: impossible");
                if let Err(error) = fs::write(&self.default_path, text) {
                    error!(%error, "failed to persist the default wallet");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("BUG: wallet lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> (WalletStore, PathBuf, PathBuf) {
        let dir = std::env::temp_dir();
        let default_path = dir.join(format!("wallet-test-{}-{name}-default.json", std::process::id()));
        let wallets_path = dir.join(format!("wallet-test-{}-{name}-all.json", std::process::id()));
        fs::remove_file(&default_path).ok();
        fs::remove_file(&wallets_path).ok();
        let store = WalletStore::load(&default_path, &wallets_path).unwrap();
        (store, default_path, wallets_path)
    }

    #[test]
    fn test_default_wallet_created_once() {
        let (store, default_path, wallets_path) = temp_store("default");

        let first = store.default_address().unwrap();
        let second = store.default_address().unwrap();
        assert_eq!(first, second);
        assert!(store.contains(&first));

        fs::remove_file(default_path).ok();
        fs::remove_file(wallets_path).ok();
    }

    #[test]
    fn test_wallets_survive_reload() {
        let (store, default_path, wallets_path) = temp_store("reload");

        let default = store.default_address().unwrap();
        let extra = store.create_wallet();

        let reloaded = WalletStore::load(&default_path, &wallets_path).unwrap();
        assert_eq!(reloaded.default_address().unwrap(), default);
        assert!(reloaded.contains(&extra));
        assert_eq!(reloaded.list().len(), 2);

        fs::remove_file(default_path).ok();
        fs::remove_file(wallets_path).ok();
    }

    #[test]
    fn test_sign_advances_and_persists_nonce() {
        let (store, default_path, wallets_path) = temp_store("sign");
        let address = store.default_address().unwrap();

        let mut tx = Transaction::new(&address, "recipient", 5);
        store.sign(&mut tx).unwrap();
        assert!(tx.verify());

        let reloaded = WalletStore::load(&default_path, &wallets_path).unwrap();
        let (_, nonce) = reloaded
            .list()
            .into_iter()
            .find(|(addr, _)| *addr == address)
            .unwrap();
        assert_eq!(nonce, 1);

        fs::remove_file(default_path).ok();
        fs::remove_file(wallets_path).ok();
    }

    #[test]
    fn test_sign_unknown_sender_rejected() {
        let (store, default_path, wallets_path) = temp_store("unknown");

        let mut tx = Transaction::new("stranger", "recipient", 5);
        assert!(matches!(store.sign(&mut tx), Err(ChainError::InvalidSigner)));

        fs::remove_file(default_path).ok();
        fs::remove_file(wallets_path).ok();
    }
}
