use crate::node::Node;
use chainlib::config::ChainConfig;
use chainlib::types::Block;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

/// Fetch a peer's full chain. None on transport errors, non-200s, or a
/// body that does not parse as a block list.
async fn fetch_peer_chain(node: &Node, peer: &str) -> Option<Vec<Block>> {
    let config = ChainConfig::global();
    let value = match node
        .network
        .fetch_json(
            peer,
            "/chain",
            Duration::from_secs(config.gossip.block_timeout_secs),
        )
        .await
    {
        Ok(value) => value,
        Err(error) => {
            debug!(%error, "chain fetch failed");
            return None;
        }
    };
    serde_json::from_value(value.get("chain")?.clone()).ok()
}

/// The longest-valid-chain rule.
///
/// Poll every healthy peer for its chain, keep candidates strictly
/// longer than the local chain that validate from genesis, adopt the
/// longest of them (first encountered wins a tie), rebuild the UTXO
/// set, and persist. Returns whether the local chain was replaced.
pub async fn resolve_conflicts(node: &Arc<Node>) -> bool {
    let local_height = node.chain.read().await.height();
    let mut best: Option<(Vec<Block>, String)> = None;
    let mut best_height = local_height;

    for peer in node.network.healthy_peers() {
        let Some(blocks) = fetch_peer_chain(node, &peer).await else {
            debug!(peer = %peer, "could not fetch chain");
            continue;
        };
        if (blocks.len() as u64) <= best_height {
            continue;
        }

        let valid = {
            let chain = node.chain.read().await;
            chain.validate_candidate(&blocks)
        };
        match valid {
            Ok(()) => {
                best_height = blocks.len() as u64;
                best = Some((blocks, peer));
            }
            Err(error) => {
                warn!(peer = %peer, %error, "peer offered an invalid chain");
            }
        }
    }

    let Some((blocks, peer)) = best else {
        return false;
    };

    let mut chain = node.chain.write().await;
    // The tip may have grown while we were polling
    if (blocks.len() as u64) <= chain.height() {
        return false;
    }
    match chain.replace_chain(blocks) {
        Ok(()) => {
            node.persist_chain(&chain);
            info!(
                from = %peer,
                height = chain.height(),
                "chain replaced by the network's longest valid chain"
            );
            true
        }
        Err(error) => {
            warn!(%error, "candidate chain failed final validation");
            false
        }
    }
}

/// Every resolver interval, run the longest-chain rule when there is
/// anyone to ask.
pub async fn periodic_resolver(node: Arc<Node>) {
    let config = ChainConfig::global();
    let mut interval = time::interval(Duration::from_secs(config.node.resolver_interval_secs));
    interval.tick().await; // the first tick fires immediately
    loop {
        interval.tick().await;
        if node.network.healthy_count() == 0 {
            continue;
        }
        debug!("periodic consensus check");
        resolve_conflicts(&node).await;
    }
}

/// Adopt a specific peer's chain if it is valid and longer, then merge
/// its peer list. Used when joining through a seed node.
pub async fn sync_with_node(node: &Arc<Node>, peer: &str) {
    if let Some(blocks) = fetch_peer_chain(node, peer).await {
        let mut chain = node.chain.write().await;
        if (blocks.len() as u64) > chain.height() {
            match chain.replace_chain(blocks) {
                Ok(()) => {
                    node.persist_chain(&chain);
                    info!(from = %peer, height = chain.height(), "chain synced from peer");
                }
                Err(error) => warn!(from = %peer, %error, "peer chain rejected during sync"),
            }
        }
    }

    let config = ChainConfig::global();
    let Ok(value) = node
        .network
        .fetch_json(
            peer,
            "/nodes/list",
            Duration::from_secs(config.gossip.peer_list_timeout_secs),
        )
        .await
    else {
        return;
    };
    let Some(peers) = value.get("nodes").and_then(|nodes| nodes.as_array()) else {
        return;
    };

    let mut added = 0;
    for peer_value in peers {
        if let Some(addr) = peer_value.as_str() {
            if node.network.add_peer(addr) {
                added += 1;
            }
        }
    }
    if added > 0 {
        node.persist_peers();
        info!(added, from = %peer, "peer list synced");
    }
}

/// Register this node with a seed: POST our address, absorb the seed's
/// view of the network, sync its chain, and schedule a discovery pass.
pub async fn register_with_seed(node: Arc<Node>, seed: String) {
    let config = ChainConfig::global();
    let payload = serde_json::json!({ "nodes": [node.self_address.clone()] });

    let response = match node
        .network
        .client()
        .post(format!("http://{seed}/nodes/register"))
        .timeout(Duration::from_secs(config.gossip.peer_list_timeout_secs))
        .json(&payload)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(seed = %seed, status = %response.status(), "seed registration refused");
            return;
        }
        Err(error) => {
            warn!(seed = %seed, %error, "seed registration failed");
            return;
        }
    };

    node.network.add_bootstrap(&seed);

    if let Ok(value) = response.json::<serde_json::Value>().await {
        if let Some(peers) = value.get("current_nodes").and_then(|nodes| nodes.as_array()) {
            for peer_value in peers {
                if let Some(addr) = peer_value.as_str() {
                    node.network.add_peer(addr);
                }
            }
        }
    }
    node.persist_peers();
    info!(seed = %seed, "registered with seed node");

    sync_with_node(&node, &seed).await;

    // Give the gossip a moment to settle before exploring further
    time::sleep(Duration::from_secs(3)).await;
    discover_network(&node).await;
}

/// Ask a handful of healthy peers for their peer lists and absorb any
/// unknown addresses. Returns the number of newly discovered peers; a
/// productive pass ends with a peer-list broadcast.
pub async fn discover_network(node: &Arc<Node>) -> usize {
    let config = ChainConfig::global();
    let mut targets = node.network.healthy_peers();
    targets.truncate(config.gossip.discovery_peer_cap);

    let mut discovered = 0;
    for peer in targets {
        let value = match node
            .network
            .fetch_json(
                peer.as_str(),
                "/nodes/list",
                Duration::from_secs(config.gossip.peer_list_timeout_secs),
            )
            .await
        {
            Ok(value) => value,
            Err(error) => {
                debug!(%error, "discovery query failed");
                continue;
            }
        };
        let Some(peers) = value.get("nodes").and_then(|nodes| nodes.as_array()) else {
            continue;
        };
        for peer_value in peers {
            if let Some(addr) = peer_value.as_str() {
                if node.network.add_peer(addr) {
                    info!(peer = addr, "discovered new peer");
                    discovered += 1;
                }
            }
        }
    }

    if discovered > 0 {
        node.persist_peers();
        node.network.broadcast_peer_list(None).await;
        info!(discovered, "network discovery complete");
    }
    discovered
}

/// One delayed discovery pass shortly after startup, once the listener
/// and the health loop have had time to come up.
pub async fn startup_discovery(node: Arc<Node>) {
    time::sleep(Duration::from_secs(5)).await;
    if node.network.known_count() == 0 {
        return;
    }
    let discovered = discover_network(&node).await;
    if discovered > 0 {
        info!(discovered, "startup discovery found new peers");
    }
}
