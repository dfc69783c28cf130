use anyhow::Result;
use argh::FromArgs;
use chainlib::config::ChainConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

mod api;
mod cli;
mod miner;
mod network;
mod node;
mod storage;
mod sync;
mod wallets;

use network::NetworkManager;
use node::Node;
use storage::{JsonChainStore, NodesFile};
use wallets::WalletStore;

#[derive(FromArgs)]
/// A peer-to-peer proof-of-work blockchain node
struct Args {
    #[argh(option)]
    /// port for the HTTP API (defaults to NODE_PORT env var or 5000)
    port: Option<u16>,
    #[argh(option)]
    /// address to bind the listener to (defaults to NODE_HOST env var or 0.0.0.0)
    host: Option<String>,
    #[argh(option)]
    /// seed node to register with on startup
    seed_url: Option<String>,
    #[argh(option)]
    /// this node's reachable address (defaults to 127.0.0.1:{port})
    my_address: Option<String>,
    #[argh(switch)]
    /// enable auto-mining on startup
    auto_mine: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration from environment
    let config = ChainConfig::global();

    // Parse command line arguments; priority: CLI args > env vars > defaults
    let args: Args = argh::from_env();
    let port = args.port.unwrap_or(config.node.port);
    let host = args.host.clone().unwrap_or_else(|| config.node.host.clone());
    let self_address = args
        .my_address
        .clone()
        .unwrap_or_else(|| format!("127.0.0.1:{port}"));

    // Assemble the node from its stores
    let store = Arc::new(JsonChainStore::new(&config.node.chain_file));
    let nodes_file = NodesFile::new(&config.node.nodes_file);
    let wallets = WalletStore::load(&config.node.default_wallet_file, &config.node.wallets_file)?;
    let network = NetworkManager::new(self_address.clone());

    for peer in nodes_file.load().unwrap_or_default() {
        network.add_peer(&peer);
    }
    if let Some(seed) = &args.seed_url {
        network.add_bootstrap(seed);
    }

    let node = Arc::new(Node::new(
        self_address,
        store,
        network,
        wallets,
        nodes_file,
        args.auto_mine,
    )?);

    info!(
        self_address = %node.self_address,
        known_peers = node.network.known_count(),
        height = node.chain.read().await.height(),
        auto_mining = node.mining.enabled(),
        "🚀 starting blockchain node"
    );

    // Long-lived workers: health checks, periodic consensus, mining,
    // delayed startup discovery
    {
        let health_node = node.clone();
        tokio::spawn(async move {
            let interval_secs = ChainConfig::global().node.health_check_interval_secs;
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                health_node.network.health_sweep().await;
            }
        });
    }
    tokio::spawn(sync::periodic_resolver(node.clone()));
    tokio::spawn(miner::mining_loop(node.clone()));
    tokio::spawn(sync::startup_discovery(node.clone()));

    if let Some(seed) = args.seed_url {
        tokio::spawn(sync::register_with_seed(node.clone(), seed));
    }

    // The HTTP API
    let app = api::router(node.clone());
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            error!(error = %e, "HTTP server stopped");
        }
    });

    // The interactive menu owns the foreground
    let menu_node = node.clone();
    tokio::task::spawn_blocking(move || cli::menu(menu_node)).await?;
    Ok(())
}
