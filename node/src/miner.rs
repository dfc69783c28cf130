use crate::node::{MiningMode, Node};
use chainlib::config::ChainConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{error, info, warn};

/// The background mining worker.
///
/// Transaction-driven: mine as soon as the mempool is non-empty.
/// Continuous: additionally mine a coinbase-only block when the chain
/// has been quiet past the empty-block threshold. Disabled: idle.
/// Mode changes take effect on the next loop iteration; a mined block
/// is gossiped to every healthy peer.
pub async fn mining_loop(node: Arc<Node>) {
    let config = ChainConfig::global();
    let idle_poll = Duration::from_secs(config.mining.idle_poll_secs);
    let post_block_pause = Duration::from_secs(config.mining.post_block_pause_secs);
    let empty_threshold = Duration::from_secs(config.mining.empty_block_threshold_secs);

    info!("mining loop started");
    let mut last_block = Instant::now();

    loop {
        let mode = node.mining.mode();
        if mode == MiningMode::Disabled {
            time::sleep(idle_poll).await;
            continue;
        }

        let miner_address = match node.default_miner_address() {
            Ok(address) => address,
            Err(error) => {
                error!(%error, "no miner address available");
                time::sleep(idle_poll).await;
                continue;
            }
        };

        let mempool_size = node.mempool.size();
        let quiet_for = last_block.elapsed();

        if mempool_size > 0 {
            info!(mempool_size, "mempool has work, mining");
            match node.mine_once(&miner_address).await {
                Ok(block) => {
                    last_block = Instant::now();
                    node.network.broadcast_block(&block, None).await;
                }
                Err(error) => warn!(%error, "mining attempt failed"),
            }
            time::sleep(post_block_pause).await;
        } else if mode == MiningMode::Continuous && quiet_for > empty_threshold {
            info!("chain quiet too long, mining an empty block");
            match node.mine_once(&miner_address).await {
                Ok(block) => {
                    last_block = Instant::now();
                    node.network.broadcast_block(&block, None).await;
                }
                Err(error) => warn!(%error, "empty-block mining failed"),
            }
            time::sleep(idle_poll).await;
        } else {
            // Wake up in time for the empty-block threshold, but check
            // the mempool at least every few seconds
            let remaining = empty_threshold.saturating_sub(quiet_for);
            let wait = remaining.max(Duration::from_secs(5)).min(empty_threshold);
            time::sleep(wait).await;
        }
    }
}
