//! Configuration module for blockchain and node parameters
//!
//! This module provides a centralized configuration system that supports:
//! - Hardcoded defaults (the crate-root constants)
//! - Environment variable overrides (for flexibility)
//!
//! Configuration priority (highest to lowest):
//! 1. Environment variables
//! 2. Hardcoded defaults

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<ChainConfig> = OnceLock::new();

/// Complete configuration for the library and the node binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Consensus rules
    pub network: NetworkConfig,

    /// Node-specific settings
    pub node: NodeConfig,

    /// Gossip and peer-health parameters
    pub gossip: GossipConfig,

    /// Mining loop parameters
    pub mining: MiningConfig,
}

/// Network consensus parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Coinbase reward per block
    pub coinbase_reward: u64,

    /// Number of blocks between difficulty adjustments
    pub difficulty_adjustment_interval: u64,

    /// Target time between blocks in seconds
    pub target_block_time: u64,

    /// Leading '0' hex characters required of a fresh chain's hashes
    pub initial_difficulty: u32,

    /// Maximum serialized block size in bytes
    pub max_block_size: usize,

    /// Maximum number of transactions per block
    pub max_txs_per_block: usize,

    /// Maximum number of pending transactions in the mempool
    pub mempool_max: usize,
}

/// Node operation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Port to listen on
    pub port: u16,

    /// Address to bind the HTTP listener to
    pub host: String,

    /// Chain + UTXO snapshot file path
    pub chain_file: String,

    /// Known-peer list file path
    pub nodes_file: String,

    /// Default wallet file path
    pub default_wallet_file: String,

    /// Wallet collection file path
    pub wallets_file: String,

    /// Seconds between health-check sweeps
    pub health_check_interval_secs: u64,

    /// Minimum seconds between probes of the same peer
    pub peer_recheck_floor_secs: u64,

    /// Seconds between periodic consensus-resolver runs
    pub resolver_interval_secs: u64,
}

/// Gossip parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Seconds a broadcast message id is remembered for loop suppression
    pub broadcast_ttl_secs: u64,

    /// Peer-list broadcast budget per minute
    pub max_broadcasts_per_minute: u32,

    /// Minimum seconds between two peer-list broadcasts
    pub broadcast_spacing_secs: u64,

    /// Delay before re-broadcasting a peer list that brought news
    pub rebroadcast_delay_secs: u64,

    /// Transaction gossip timeout in seconds
    pub tx_timeout_secs: u64,

    /// Block gossip and chain fetch timeout in seconds
    pub block_timeout_secs: u64,

    /// Peer-list sync timeout in seconds
    pub peer_list_timeout_secs: u64,

    /// Health probe timeout in seconds
    pub health_timeout_secs: u64,

    /// Maximum number of peers queried in one discovery pass
    pub discovery_peer_cap: usize,
}

/// Mining loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Seconds without a new block before the continuous mode mines an
    /// empty (coinbase-only) block
    pub empty_block_threshold_secs: u64,

    /// Sleep between iterations while mining is disabled
    pub idle_poll_secs: u64,

    /// Pause after mining a block that carried transactions
    pub post_block_pause_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            coinbase_reward: crate::COINBASE_REWARD,
            difficulty_adjustment_interval: crate::DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_block_time: crate::TARGET_BLOCK_TIME,
            initial_difficulty: crate::INITIAL_DIFFICULTY,
            max_block_size: crate::MAX_BLOCK_SIZE,
            max_txs_per_block: crate::MAX_TXS_PER_BLOCK,
            mempool_max: crate::MEMPOOL_MAX,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            chain_file: "./chain_data.json".to_string(),
            nodes_file: "./nodes_list.json".to_string(),
            default_wallet_file: "./default_wallet.json".to_string(),
            wallets_file: "./wallets.json".to_string(),
            health_check_interval_secs: 30,
            peer_recheck_floor_secs: 10,
            resolver_interval_secs: 60,
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            broadcast_ttl_secs: 10,
            max_broadcasts_per_minute: 10,
            broadcast_spacing_secs: 1,
            rebroadcast_delay_secs: 2,
            tx_timeout_secs: 3,
            block_timeout_secs: 5,
            peer_list_timeout_secs: 5,
            health_timeout_secs: 3,
            discovery_peer_cap: 5,
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            empty_block_threshold_secs: 30,
            idle_poll_secs: 10,
            post_block_pause_secs: 5,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            node: NodeConfig::default(),
            gossip: GossipConfig::default(),
            mining: MiningConfig::default(),
        }
    }
}

impl ChainConfig {
    /// Load configuration: environment variables over hardcoded defaults.
    pub fn load() -> Self {
        ChainConfig {
            network: NetworkConfig::from_env(),
            node: NodeConfig::from_env(),
            gossip: GossipConfig::from_env(),
            mining: MiningConfig::from_env(),
        }
    }

    /// Get or initialize the global configuration
    pub fn global() -> &'static ChainConfig {
        CONFIG.get_or_init(ChainConfig::load)
    }
}

impl NetworkConfig {
    fn from_env() -> Self {
        let defaults = NetworkConfig::default();
        Self {
            coinbase_reward: parse_env("COINBASE_REWARD").unwrap_or(defaults.coinbase_reward),
            difficulty_adjustment_interval: parse_env("DIFFICULTY_ADJUSTMENT_INTERVAL")
                .unwrap_or(defaults.difficulty_adjustment_interval),
            target_block_time: parse_env("TARGET_BLOCK_TIME").unwrap_or(defaults.target_block_time),
            initial_difficulty: parse_env("INITIAL_DIFFICULTY")
                .unwrap_or(defaults.initial_difficulty),
            max_block_size: parse_env("MAX_BLOCK_SIZE").unwrap_or(defaults.max_block_size),
            max_txs_per_block: parse_env("MAX_TXS_PER_BLOCK").unwrap_or(defaults.max_txs_per_block),
            mempool_max: parse_env("MEMPOOL_MAX").unwrap_or(defaults.mempool_max),
        }
    }
}

impl NodeConfig {
    fn from_env() -> Self {
        let defaults = NodeConfig::default();
        Self {
            port: parse_env("NODE_PORT").unwrap_or(defaults.port),
            host: env_var("NODE_HOST").unwrap_or(defaults.host),
            chain_file: env_var("CHAIN_FILE").unwrap_or(defaults.chain_file),
            nodes_file: env_var("NODES_FILE").unwrap_or(defaults.nodes_file),
            default_wallet_file: env_var("DEFAULT_WALLET_FILE")
                .unwrap_or(defaults.default_wallet_file),
            wallets_file: env_var("WALLETS_FILE").unwrap_or(defaults.wallets_file),
            health_check_interval_secs: parse_env("HEALTH_CHECK_INTERVAL")
                .unwrap_or(defaults.health_check_interval_secs),
            peer_recheck_floor_secs: parse_env("PEER_RECHECK_FLOOR")
                .unwrap_or(defaults.peer_recheck_floor_secs),
            resolver_interval_secs: parse_env("RESOLVER_INTERVAL")
                .unwrap_or(defaults.resolver_interval_secs),
        }
    }
}

impl GossipConfig {
    fn from_env() -> Self {
        let defaults = GossipConfig::default();
        Self {
            broadcast_ttl_secs: parse_env("BROADCAST_TTL").unwrap_or(defaults.broadcast_ttl_secs),
            max_broadcasts_per_minute: parse_env("MAX_BROADCASTS_PER_MINUTE")
                .unwrap_or(defaults.max_broadcasts_per_minute),
            broadcast_spacing_secs: parse_env("BROADCAST_SPACING")
                .unwrap_or(defaults.broadcast_spacing_secs),
            rebroadcast_delay_secs: parse_env("REBROADCAST_DELAY")
                .unwrap_or(defaults.rebroadcast_delay_secs),
            tx_timeout_secs: parse_env("TX_GOSSIP_TIMEOUT").unwrap_or(defaults.tx_timeout_secs),
            block_timeout_secs: parse_env("BLOCK_GOSSIP_TIMEOUT")
                .unwrap_or(defaults.block_timeout_secs),
            peer_list_timeout_secs: parse_env("PEER_LIST_TIMEOUT")
                .unwrap_or(defaults.peer_list_timeout_secs),
            health_timeout_secs: parse_env("HEALTH_TIMEOUT")
                .unwrap_or(defaults.health_timeout_secs),
            discovery_peer_cap: parse_env("DISCOVERY_PEER_CAP")
                .unwrap_or(defaults.discovery_peer_cap),
        }
    }
}

impl MiningConfig {
    fn from_env() -> Self {
        let defaults = MiningConfig::default();
        Self {
            empty_block_threshold_secs: parse_env("EMPTY_BLOCK_THRESHOLD")
                .unwrap_or(defaults.empty_block_threshold_secs),
            idle_poll_secs: parse_env("MINING_IDLE_POLL").unwrap_or(defaults.idle_poll_secs),
            post_block_pause_secs: parse_env("MINING_POST_BLOCK_PAUSE")
                .unwrap_or(defaults.post_block_pause_secs),
        }
    }
}

// Free accessors for the consensus constants the hot paths read.

pub fn coinbase_reward() -> u64 {
    ChainConfig::global().network.coinbase_reward
}

pub fn difficulty_adjustment_interval() -> u64 {
    ChainConfig::global().network.difficulty_adjustment_interval
}

pub fn target_block_time() -> u64 {
    ChainConfig::global().network.target_block_time
}

pub fn initial_difficulty() -> u32 {
    ChainConfig::global().network.initial_difficulty
}

pub fn max_block_size() -> usize {
    ChainConfig::global().network.max_block_size
}

pub fn max_txs_per_block() -> usize {
    ChainConfig::global().network.max_txs_per_block
}

pub fn mempool_max() -> usize {
    ChainConfig::global().network.mempool_max
}

/// Helper function to get environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Helper function to parse environment variable
fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads() {
        let config = ChainConfig::default();
        assert_eq!(config.network.coinbase_reward, 50);
        assert_eq!(config.network.initial_difficulty, 2);
        assert_eq!(config.node.port, 5000);
    }

    #[test]
    fn test_gossip_defaults_match_protocol() {
        let config = ChainConfig::default();
        assert_eq!(config.gossip.broadcast_ttl_secs, 10);
        assert_eq!(config.gossip.max_broadcasts_per_minute, 10);
        assert_eq!(config.gossip.tx_timeout_secs, 3);
        assert_eq!(config.gossip.block_timeout_secs, 5);
    }
}
