use crate::network::PeerListSync;
use crate::node::{BlockOutcome, MiningMode, Node};
use crate::sync;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chainlib::config::ChainConfig;
use chainlib::error::ChainError;
use chainlib::types::{Block, Transaction};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The node's REST surface. Validation failures map to 400 with a
/// short message, missing resources to 404, internal failures to 500.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chain", get(full_chain))
        .route("/block/:index", get(get_block))
        .route("/block/receive", post(receive_block))
        .route("/transaction/:txid", get(get_transaction))
        .route("/transaction/new", post(new_transaction))
        .route("/transaction/broadcast", post(receive_broadcast_transaction))
        .route("/balance/:address", get(get_balance))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/sync", post(sync_nodes))
        .route("/nodes/list", get(list_nodes))
        .route("/nodes/status/:addr", get(node_status))
        .route("/nodes/check/:addr", post(check_node))
        .route("/nodes/resolve", get(resolve))
        .route("/mempool", get(mempool_info))
        .route("/mine", get(mine))
        .route("/auto_mining", post(auto_mining))
        .route("/mining/mode", post(mining_mode))
        .route("/mining/status", get(mining_status))
        .with_state(node)
}

fn bad_request(message: impl ToString) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.to_string() })),
    )
}

fn not_found(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

async fn health(State(node): State<Arc<Node>>) -> Json<Value> {
    let block_height = node.chain.read().await.height();
    Json(json!({
        "status": "healthy",
        "block_height": block_height,
        "mempool_size": node.mempool.size(),
        "peers_count": node.network.known_count(),
        "auto_mining": node.mining.enabled(),
    }))
}

async fn full_chain(State(node): State<Arc<Node>>) -> Json<Value> {
    let chain = node.chain.read().await;
    Json(json!({
        "chain": chain.blocks(),
        "length": chain.height(),
        "difficulty": chain.difficulty(),
    }))
}

async fn get_block(
    State(node): State<Arc<Node>>,
    Path(index): Path<u64>,
) -> impl IntoResponse {
    let chain = node.chain.read().await;
    match chain.block(index) {
        Some(block) => Json(serde_json::to_value(block).expect("BUG: impossible")).into_response(),
        None => {
            not_found(&ChainError::UnknownBlockIndex { index }.to_string()).into_response()
        }
    }
}

async fn get_transaction(
    State(node): State<Arc<Node>>,
    Path(txid): Path<String>,
) -> impl IntoResponse {
    {
        let chain = node.chain.read().await;
        if let Some(tx) = chain.find_transaction(&txid) {
            return Json(serde_json::to_value(tx).expect("BUG: impossible")).into_response();
        }
    }
    match node.mempool.get(&txid) {
        Some(tx) => Json(serde_json::to_value(&tx).expect("BUG: impossible")).into_response(),
        None => not_found("transaction not found").into_response(),
    }
}

async fn get_balance(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Json<Value> {
    let balance = node.chain.read().await.balance(&address);
    Json(json!({ "address": address, "balance": balance }))
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    nodes: Vec<String>,
}

async fn register_nodes(
    State(node): State<Arc<Node>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    if request.nodes.is_empty() {
        return bad_request("a list of nodes is required").into_response();
    }

    let mut newly_added = vec![];
    for addr in &request.nodes {
        if node.network.add_peer(addr) {
            newly_added.push(addr.clone());
        }
    }

    if !newly_added.is_empty() {
        node.persist_peers();
        // Tell the rest of the network, but not the caller
        let gossip_node = node.clone();
        let source = remote.ip().to_string();
        tokio::spawn(async move {
            gossip_node.network.broadcast_peer_list(Some(&source)).await;
        });
    }

    let response = json!({
        "message": format!("added {} new nodes", newly_added.len()),
        "newly_added": newly_added,
        "total_nodes": node.network.known_count(),
        "current_nodes": node.network.known_peers(),
    });
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn sync_nodes(
    State(node): State<Arc<Node>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(request): Json<PeerListSync>,
) -> impl IntoResponse {
    // Loop suppression: a message id seen within the TTL is dropped
    // without touching any state
    if !node
        .network
        .record_broadcast(&request.message_id, &remote.ip().to_string())
    {
        return Json(json!({ "message": "sync already processed" })).into_response();
    }

    if request.nodes.is_empty() {
        return bad_request("a list of nodes is required").into_response();
    }

    let mut newly_added = vec![];
    for addr in &request.nodes {
        if node.network.add_peer(addr) {
            newly_added.push(addr.clone());
        }
    }

    if !newly_added.is_empty() {
        node.persist_peers();
        info!(
            added = newly_added.len(),
            source = %request.source_node,
            "peer-list sync brought news"
        );
        // Damped re-broadcast: wait before fanning the news out again
        let gossip_node = node.clone();
        tokio::spawn(async move {
            let delay = ChainConfig::global().gossip.rebroadcast_delay_secs;
            tokio::time::sleep(Duration::from_secs(delay)).await;
            gossip_node.network.broadcast_peer_list(None).await;
        });
    }

    Json(json!({
        "message": format!("synced {} new nodes", newly_added.len()),
        "newly_added": newly_added,
        "total_nodes": node.network.known_count(),
    }))
    .into_response()
}

async fn list_nodes(State(node): State<Arc<Node>>) -> Json<Value> {
    Json(json!({
        "nodes": node.network.known_peers(),
        "healthy_peers": node.network.healthy_peers(),
        "total": node.network.known_count(),
    }))
}

async fn node_status(
    State(node): State<Arc<Node>>,
    Path(addr): Path<String>,
) -> Json<Value> {
    let status = node.network.peer_status(&addr);
    let label = if node.network.is_healthy(&addr) {
        "healthy"
    } else if status.last_check == 0 {
        "unknown"
    } else {
        "unhealthy"
    };
    Json(json!({
        "status": label,
        "retries": status.retries,
        "last_check": status.last_check,
        "last_seen": status.last_seen,
    }))
}

async fn check_node(
    State(node): State<Arc<Node>>,
    Path(addr): Path<String>,
) -> Json<Value> {
    let healthy = node.network.probe_peer(&addr).await;
    Json(json!({
        "node": addr,
        "healthy": healthy,
        "message": format!("peer is {}", if healthy { "healthy" } else { "unhealthy" }),
    }))
}

async fn mempool_info(State(node): State<Arc<Node>>) -> Json<Value> {
    Json(json!({
        "size": node.mempool.size(),
        "transactions": node.mempool.transactions(),
    }))
}

/// A transaction originated by a wallet talking to this node: validate,
/// admit, gossip to every healthy peer.
async fn new_transaction(
    State(node): State<Arc<Node>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let tx: Transaction = match serde_json::from_value(body) {
        Ok(tx) => tx,
        Err(_) => return bad_request("missing or mistyped transaction fields").into_response(),
    };

    match node.admit_transaction(tx.clone()).await {
        Ok(()) => {
            let gossip_node = node.clone();
            tokio::spawn(async move {
                gossip_node.network.broadcast_transaction(&tx, None).await;
            });
            Json(json!({ "message": "transaction admitted to mempool and broadcast" }))
                .into_response()
        }
        Err(error) => bad_request(error).into_response(),
    }
}

/// A transaction gossiped by a peer: validate, admit, forward to the
/// other peers (never back toward the source host).
async fn receive_broadcast_transaction(
    State(node): State<Arc<Node>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let tx: Transaction = match serde_json::from_value(body) {
        Ok(tx) => tx,
        Err(_) => return bad_request("missing or mistyped transaction fields").into_response(),
    };

    match node.admit_transaction(tx.clone()).await {
        Ok(()) => {
            info!(txid = %tx.txid, "gossiped transaction admitted");
            let gossip_node = node.clone();
            let source = remote.ip().to_string();
            tokio::spawn(async move {
                gossip_node
                    .network
                    .broadcast_transaction(&tx, Some(&source))
                    .await;
            });
            Json(json!({ "message": "transaction accepted" })).into_response()
        }
        // A duplicate means this gossip already reached us another way
        Err(ChainError::DuplicateTx { .. }) => {
            Json(json!({ "message": "transaction already known" })).into_response()
        }
        Err(error) => bad_request(error).into_response(),
    }
}

/// A block gossiped by a peer: append when it extends the tip, trigger
/// the consensus resolver when it is ahead, acknowledge stale blocks
/// without doing anything.
async fn receive_block(
    State(node): State<Arc<Node>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let block: Block = match serde_json::from_value(body) {
        Ok(block) => block,
        Err(_) => return bad_request("missing or mistyped block fields").into_response(),
    };

    let index = block.index;
    match node.receive_block(block.clone()).await {
        BlockOutcome::Appended => {
            info!(index, "gossiped block appended");
            let gossip_node = node.clone();
            let source = remote.ip().to_string();
            tokio::spawn(async move {
                gossip_node
                    .network
                    .broadcast_block(&block, Some(&source))
                    .await;
            });
            Json(json!({ "message": "block accepted" })).into_response()
        }
        BlockOutcome::Ahead => {
            info!(index, reason = %ChainError::ChainBehind, "running the consensus resolver");
            let resolver_node = node.clone();
            tokio::spawn(async move {
                sync::resolve_conflicts(&resolver_node).await;
            });
            Json(json!({ "message": "chain sync triggered" })).into_response()
        }
        BlockOutcome::Stale => {
            Json(json!({ "message": "block is not newer than the local chain" })).into_response()
        }
        BlockOutcome::Rejected(error) => {
            warn!(index, %error, "gossiped block rejected");
            bad_request(error).into_response()
        }
    }
}

#[derive(Deserialize)]
struct MineParams {
    miner_address: Option<String>,
}

async fn mine(
    State(node): State<Arc<Node>>,
    Query(params): Query<MineParams>,
) -> impl IntoResponse {
    let miner_address = match params.miner_address {
        Some(address) if !address.is_empty() => address,
        _ => match node.default_miner_address() {
            Ok(address) => address,
            Err(error) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": error.to_string() })),
                )
                    .into_response()
            }
        },
    };

    match node.mine_once(&miner_address).await {
        Ok(block) => {
            let gossip_node = node.clone();
            let gossip_block = block.clone();
            tokio::spawn(async move {
                gossip_node.network.broadcast_block(&gossip_block, None).await;
            });
            Json(json!({ "message": "new block mined", "block": block })).into_response()
        }
        Err(error) => bad_request(error).into_response(),
    }
}

#[derive(Deserialize, Default)]
struct AutoMiningRequest {
    enable: Option<bool>,
}

async fn auto_mining(
    State(node): State<Arc<Node>>,
    body: Option<Json<AutoMiningRequest>>,
) -> Json<Value> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let enabled = match request.enable {
        Some(enable) => node.mining.set_enabled(enable),
        None => node.mining.toggle(),
    };
    Json(json!({
        "message": format!("auto-mining {}", if enabled { "enabled" } else { "disabled" }),
        "auto_mining_enabled": enabled,
    }))
}

#[derive(Deserialize)]
struct MiningModeRequest {
    mode: String,
}

async fn mining_mode(
    State(node): State<Arc<Node>>,
    Json(request): Json<MiningModeRequest>,
) -> impl IntoResponse {
    let Some(mode) = MiningMode::parse(&request.mode) else {
        return bad_request("mode must be continuous, transaction_driven, or disabled")
            .into_response();
    };
    node.mining.set_mode(mode);
    Json(json!({
        "message": format!("mining mode set to {}", mode.as_str()),
        "auto_mining_enabled": mode != MiningMode::Disabled,
        "mode": mode.as_str(),
    }))
    .into_response()
}

async fn mining_status(State(node): State<Arc<Node>>) -> Json<Value> {
    let blockchain_height = node.chain.read().await.height();
    Json(json!({
        "auto_mining_enabled": node.mining.enabled(),
        "mode": node.mining.mode().as_str(),
        "mempool_size": node.mempool.size(),
        "blockchain_height": blockchain_height,
    }))
}

async fn resolve(State(node): State<Arc<Node>>) -> Json<Value> {
    let replaced = sync::resolve_conflicts(&node).await;
    let chain = node.chain.read().await;
    Json(json!({
        "message": if replaced {
            "chain replaced by the network's longest valid chain"
        } else {
            "local chain is authoritative"
        },
        "replaced": replaced,
        "length": chain.height(),
        "chain": chain.blocks(),
    }))
}
