use crate::network::NetworkManager;
use crate::storage::NodesFile;
use crate::wallets::WalletStore;
use chainlib::config;
use chainlib::error::{ChainError, Result as ChainResult};
use chainlib::store::ChainStore;
use chainlib::types::{Block, Chain, Mempool, Transaction};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// How the background miner behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiningMode {
    /// Mine whenever the mempool is non-empty, plus empty blocks when
    /// the chain has been quiet for too long.
    Continuous,
    /// Mine only when the mempool is non-empty.
    TransactionDriven,
    /// The loop idles.
    Disabled,
}

impl MiningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MiningMode::Continuous => "continuous",
            MiningMode::TransactionDriven => "transaction_driven",
            MiningMode::Disabled => "disabled",
        }
    }

    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "continuous" => Some(MiningMode::Continuous),
            "transaction_driven" => Some(MiningMode::TransactionDriven),
            "disabled" => Some(MiningMode::Disabled),
            _ => None,
        }
    }
}

/// Runtime-switchable mining mode; takes effect on the loop's next
/// iteration.
pub struct MiningState {
    mode: Mutex<MiningMode>,
}

impl MiningState {
    pub fn new(auto_mine: bool) -> Self {
        MiningState {
            mode: Mutex::new(if auto_mine {
                MiningMode::TransactionDriven
            } else {
                MiningMode::Disabled
            }),
        }
    }

    pub fn mode(&self) -> MiningMode {
        *self.mode.lock().expect("BUG: mining mode lock poisoned")
    }

    pub fn set_mode(&self, mode: MiningMode) {
        *self.mode.lock().expect("BUG: mining mode lock poisoned") = mode;
        info!(mode = mode.as_str(), "mining mode set");
    }

    pub fn enabled(&self) -> bool {
        self.mode() != MiningMode::Disabled
    }

    /// Flip between disabled and transaction-driven. Returns the new
    /// enabled state.
    pub fn toggle(&self) -> bool {
        let next = match self.mode() {
            MiningMode::Disabled => MiningMode::TransactionDriven,
            _ => MiningMode::Disabled,
        };
        self.set_mode(next);
        next != MiningMode::Disabled
    }

    pub fn set_enabled(&self, enable: bool) -> bool {
        let next = if enable {
            match self.mode() {
                MiningMode::Disabled => MiningMode::TransactionDriven,
                current => current,
            }
        } else {
            MiningMode::Disabled
        };
        self.set_mode(next);
        next != MiningMode::Disabled
    }
}

/// What happened to a block received from a peer.
#[derive(Debug)]
pub enum BlockOutcome {
    /// Appended on top of the local tip.
    Appended,
    /// The block is more than one ahead; the caller should trigger the
    /// consensus resolver.
    Ahead,
    /// Not newer than the local chain; ignored.
    Stale,
    /// Next in sequence but failed validation.
    Rejected(ChainError),
}

/// The running node: every subsystem composed into one value that is
/// shared as `Arc<Node>` by the HTTP handlers, the background workers,
/// and the CLI menu.
///
/// Lock order: the chain lock is the outermost and is held across
/// validation, append, UTXO update, retarget, and persistence as one
/// step. The mempool and the network manager use their own interior
/// locks and are never acquired while holding each other.
pub struct Node {
    pub chain: RwLock<Chain>,
    pub mempool: Mempool,
    pub network: NetworkManager,
    pub wallets: WalletStore,
    pub mining: MiningState,
    store: Arc<dyn ChainStore>,
    nodes_file: NodesFile,
    pub self_address: String,
}

impl Node {
    pub fn new(
        self_address: String,
        store: Arc<dyn ChainStore>,
        network: NetworkManager,
        wallets: WalletStore,
        nodes_file: NodesFile,
        auto_mine: bool,
    ) -> anyhow::Result<Self> {
        let chain = match store.load()? {
            Some(snapshot) => {
                let chain = Chain::restore(snapshot.chain);
                info!(height = chain.height(), "chain loaded from disk");
                chain
            }
            None => Chain::new(),
        };

        Ok(Node {
            chain: RwLock::new(chain),
            mempool: Mempool::new(),
            network,
            wallets,
            mining: MiningState::new(auto_mine),
            store,
            nodes_file,
            self_address,
        })
    }

    /// Persist the chain snapshot. Best-effort: a failed write is
    /// logged and the append that produced it stands.
    pub fn persist_chain(&self, chain: &Chain) {
        if let Err(error) = self.store.save(&chain.snapshot()) {
            error!(%error, "failed to persist chain snapshot");
        }
    }

    /// Persist the known-peer list. Best-effort like the chain.
    pub fn persist_peers(&self) {
        if let Err(error) = self.nodes_file.save(&self.network.known_peers()) {
            error!(%error, "failed to persist peer list");
        }
    }

    /// Validate a transaction against the current chain state and admit
    /// it to the mempool. Gossip is the caller's move.
    pub async fn admit_transaction(&self, tx: Transaction) -> ChainResult<()> {
        {
            let chain = self.chain.read().await;
            chain.validate_transaction(&tx)?;
        }
        self.mempool.add(tx)
    }

    /// Append a block through the validated path: validation, UTXO
    /// update, difficulty retarget, and persistence under the chain
    /// write lock, then mempool cleanup.
    pub async fn append_block(&self, block: Block) -> ChainResult<()> {
        let confirmed: Vec<String> = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| tx.txid.clone())
            .collect();

        {
            let mut chain = self.chain.write().await;
            chain.add_block(block)?;
            self.persist_chain(&chain);
        }

        let mut removed = 0;
        for txid in &confirmed {
            if self.mempool.remove(txid) {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "confirmed transactions cleared from mempool");
        }
        Ok(())
    }

    /// Handle a block received from a peer.
    pub async fn receive_block(&self, block: Block) -> BlockOutcome {
        let next_index = {
            let chain = self.chain.read().await;
            chain.tip().map(|tip| tip.index + 1).unwrap_or(0)
        };

        if block.index == next_index {
            match self.append_block(block).await {
                Ok(()) => BlockOutcome::Appended,
                Err(error) => BlockOutcome::Rejected(error),
            }
        } else if block.index > next_index {
            BlockOutcome::Ahead
        } else {
            BlockOutcome::Stale
        }
    }

    /// Mine one block for `miner_address`: take pending transactions
    /// from the mempool and hand them to the chain engine's mining
    /// path. On failure the engine leaves the chain unchanged and the
    /// non-coinbase transactions go back into the pool.
    pub async fn mine_once(&self, miner_address: &str) -> ChainResult<Block> {
        // Leave room for the coinbase inside the per-block cap
        let pending = self
            .mempool
            .take(config::max_txs_per_block().saturating_sub(1));
        info!(
            count = pending.len(),
            miner = miner_address,
            "mining started"
        );

        let result = {
            let mut chain = self.chain.write().await;
            let result = chain.mine(miner_address, pending.clone());
            if result.is_ok() {
                self.persist_chain(&chain);
            }
            result
        };

        match result {
            Ok(block) => {
                // Copies of the mined transactions may have arrived via
                // gossip between the take and the append
                for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                    self.mempool.remove(&tx.txid);
                }
                info!(
                    index = block.index,
                    hash = %block.hash,
                    transactions = block.transactions.len(),
                    "new block mined"
                );
                Ok(block)
            }
            Err(error) => {
                warn!(%error, "mining failed, re-admitting transactions");
                self.readmit(pending);
                Err(error)
            }
        }
    }

    fn readmit(&self, transactions: Vec<Transaction>) {
        for tx in transactions {
            if tx.is_coinbase() {
                continue;
            }
            if let Err(error) = self.mempool.add(tx) {
                warn!(%error, "could not re-admit transaction");
            }
        }
    }

    /// Miner address for unattended paths: the configured default
    /// wallet, created on first use.
    pub fn default_miner_address(&self) -> anyhow::Result<String> {
        self.wallets.default_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mining_mode_parse() {
        assert_eq!(MiningMode::parse("continuous"), Some(MiningMode::Continuous));
        assert_eq!(
            MiningMode::parse("transaction_driven"),
            Some(MiningMode::TransactionDriven)
        );
        assert_eq!(MiningMode::parse("disabled"), Some(MiningMode::Disabled));
        assert_eq!(MiningMode::parse("warp-speed"), None);
    }

    #[test]
    fn test_mining_state_toggle() {
        let state = MiningState::new(false);
        assert!(!state.enabled());

        assert!(state.toggle());
        assert_eq!(state.mode(), MiningMode::TransactionDriven);

        assert!(!state.toggle());
        assert_eq!(state.mode(), MiningMode::Disabled);
    }

    #[test]
    fn test_mining_state_set_enabled_keeps_mode() {
        let state = MiningState::new(false);
        state.set_mode(MiningMode::Continuous);

        // Enabling an already-enabled state keeps the current mode
        assert!(state.set_enabled(true));
        assert_eq!(state.mode(), MiningMode::Continuous);

        assert!(!state.set_enabled(false));
        assert_eq!(state.mode(), MiningMode::Disabled);

        // Re-enabling from disabled falls back to transaction-driven
        assert!(state.set_enabled(true));
        assert_eq!(state.mode(), MiningMode::TransactionDriven);
    }
}
