use crate::node::{MiningMode, Node};
use crate::sync;
use chainlib::types::Transaction;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::runtime::Handle;

/// The interactive menu. Runs on a blocking thread; async node
/// operations are driven through the runtime handle.
pub fn menu(node: Arc<Node>) {
    let handle = Handle::current();
    loop {
        print_menu(&node);
        match prompt("choose an option (1-14): ").as_str() {
            "1" => register_node(&node, &handle),
            "2" => create_genesis(&node, &handle),
            "3" => create_wallet(&node),
            "4" => send_transaction(&node, &handle),
            "5" => mine_block(&node, &handle),
            "6" => view_chain(&node, &handle),
            "7" => query_balance(&node, &handle),
            "8" => list_wallets(&node, &handle),
            "9" => view_network(&node, &handle),
            "10" => view_mempool(&node),
            "11" => resolve_conflicts(&node, &handle),
            "12" => toggle_auto_mining(&node),
            "13" => switch_mining_mode(&node),
            "14" => {
                println!("exiting...");
                std::process::exit(0);
            }
            _ => println!("invalid option, try again"),
        }
    }
}

fn print_menu(node: &Node) {
    println!("\n{}", "=".repeat(50));
    println!("           blockchain node console");
    println!("{}", "=".repeat(50));
    println!(" 1. register with a seed node");
    println!(" 2. create the genesis block");
    println!(" 3. create a wallet");
    println!(" 4. send a transaction");
    println!(" 5. mine a block");
    println!(" 6. view the chain (last 10 blocks)");
    println!(" 7. query a balance");
    println!(" 8. list wallets");
    println!(" 9. view network peers");
    println!("10. view the mempool");
    println!("11. resolve chain conflicts");
    println!(
        "12. {} auto-mining",
        if node.mining.enabled() { "disable" } else { "enable" }
    );
    println!(
        "13. switch mining mode (current: {})",
        node.mining.mode().as_str()
    );
    println!("14. quit");
    println!("{}", "=".repeat(50));
}

fn prompt(message: &str) -> String {
    print!("{message}");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok();
    line.trim().to_string()
}

/// First `max` characters of a string, for display. Safe on any UTF-8.
fn short(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn register_node(node: &Arc<Node>, handle: &Handle) {
    let seed = prompt("seed node address (e.g. 127.0.0.1:5000), empty to cancel: ");
    if seed.is_empty() {
        println!("registration skipped");
        return;
    }
    println!("registering {} with {seed}...", node.self_address);
    handle.block_on(sync::register_with_seed(node.clone(), seed));
    println!(
        "known peers: {} ({} healthy)",
        node.network.known_count(),
        node.network.healthy_count()
    );
}

fn create_genesis(node: &Arc<Node>, handle: &Handle) {
    handle.block_on(async {
        let mut chain = node.chain.write().await;
        match chain.create_genesis() {
            Ok(block) => {
                node.persist_chain(&chain);
                println!("genesis block created: {}", block.hash);
            }
            Err(error) => println!("could not create genesis: {error}"),
        }
    });
}

fn create_wallet(node: &Arc<Node>) {
    let address = node.wallets.create_wallet();
    println!("new wallet created");
    println!("address: {address}");
    println!("the private key is stored in the wallet file, keep it safe");
}

fn send_transaction(node: &Arc<Node>, handle: &Handle) {
    let wallets = node.wallets.list();
    if wallets.is_empty() {
        println!("no wallets available, create one first");
        return;
    }

    println!("available wallets:");
    for (i, (address, _)) in wallets.iter().enumerate() {
        let balance = handle.block_on(async { node.chain.read().await.balance(address) });
        println!("{}. {}... (balance: {balance})", i + 1, short(address, 16));
    }

    let sender = match prompt("sender wallet number: ").parse::<usize>() {
        Ok(n) if n >= 1 && n <= wallets.len() => wallets[n - 1].0.clone(),
        _ => {
            println!("invalid selection");
            return;
        }
    };
    let recipient = prompt("recipient address: ");
    let Ok(amount) = prompt("amount: ").parse::<u64>() else {
        println!("amount must be a whole number");
        return;
    };

    let mut tx = Transaction::new(&sender, &recipient, amount);
    if let Err(error) = node.wallets.sign(&mut tx) {
        println!("could not sign: {error}");
        return;
    }

    match handle.block_on(node.admit_transaction(tx.clone())) {
        Ok(()) => {
            println!("transaction admitted to the mempool");
            println!("txid: {}", tx.txid);
            let delivered = handle.block_on(node.network.broadcast_transaction(&tx, None));
            println!("broadcast to {delivered} peers");
        }
        Err(error) => println!("transaction rejected: {error}"),
    }
}

fn mine_block(node: &Arc<Node>, handle: &Handle) {
    let default = match node.default_miner_address() {
        Ok(address) => address,
        Err(error) => {
            println!("no miner address available: {error}");
            return;
        }
    };
    let input = prompt(&format!(
        "miner address (empty for default {}...): ",
        short(&default, 16)
    ));
    let miner = if input.is_empty() { default } else { input };

    match handle.block_on(node.mine_once(&miner)) {
        Ok(block) => {
            println!("block #{} mined: {}", block.index, block.hash);
            println!("transactions: {}", block.transactions.len());
            let delivered = handle.block_on(node.network.broadcast_block(&block, None));
            println!("broadcast to {delivered} peers");
        }
        Err(error) => println!("mining failed: {error}"),
    }
}

fn view_chain(node: &Arc<Node>, handle: &Handle) {
    handle.block_on(async {
        let chain = node.chain.read().await;
        if chain.height() == 0 {
            println!("the chain is empty");
            return;
        }

        println!("blocks: {}", chain.height());
        println!("difficulty: {}", chain.difficulty());
        println!(
            "auto-mining: {}",
            if node.mining.enabled() { "enabled" } else { "disabled" }
        );

        let blocks = chain.blocks();
        let start = blocks.len().saturating_sub(10);
        for block in &blocks[start..] {
            println!("{}", "-".repeat(60));
            println!("block #{} | timestamp: {}", block.index, block.timestamp);
            println!("prev hash: {}...", short(&block.previous_hash, 16));
            println!("hash:      {}...", short(&block.hash, 16));
            println!("transactions: {} | nonce: {}", block.transactions.len(), block.nonce);
        }
        println!("{}", "-".repeat(60));
    });
}

fn query_balance(node: &Arc<Node>, handle: &Handle) {
    let address = prompt("address to query: ");
    let balance = handle.block_on(async { node.chain.read().await.balance(&address) });
    println!("balance of {address}: {balance}");
}

fn list_wallets(node: &Arc<Node>, handle: &Handle) {
    let wallets = node.wallets.list();
    if wallets.is_empty() {
        println!("no wallets found, create one first");
        return;
    }
    for (i, (address, nonce)) in wallets.iter().enumerate() {
        let balance = handle.block_on(async { node.chain.read().await.balance(address) });
        println!("{}. address: {address}", i + 1);
        println!("   balance: {balance}");
        println!("   nonce: {nonce}");
    }
}

fn view_network(node: &Arc<Node>, handle: &Handle) {
    loop {
        let known = node.network.known_peers();
        let mut healthy = vec![];
        let mut unhealthy = vec![];
        for peer in known {
            if node.network.is_healthy(&peer) {
                healthy.push(peer);
            } else {
                unhealthy.push(peer);
            }
        }

        println!(
            "\npeers: {} known, {} healthy",
            healthy.len() + unhealthy.len(),
            healthy.len()
        );
        println!("healthy:");
        for (i, peer) in healthy.iter().enumerate() {
            println!("  {}. {peer}", i + 1);
        }
        println!("unhealthy:");
        for (i, peer) in unhealthy.iter().enumerate() {
            println!("  {}. {peer}", healthy.len() + i + 1);
        }

        println!("\ncommands: peer number = details, d = discover, c = check all, s = sync list, r = return");
        let choice = prompt("choose: ");
        let all: Vec<String> = healthy.iter().chain(unhealthy.iter()).cloned().collect();

        if let Ok(n) = choice.parse::<usize>() {
            if n >= 1 && n <= all.len() {
                show_peer_details(node, handle, &all[n - 1]);
            } else {
                println!("no such peer");
            }
        } else {
            match choice.as_str() {
                "d" => {
                    let discovered = handle.block_on(sync::discover_network(node));
                    println!("discovered {discovered} new peers");
                }
                "c" => {
                    let mut healthy_count = 0;
                    let peers = node.network.known_peers();
                    for peer in &peers {
                        if handle.block_on(node.network.probe_peer(peer)) {
                            healthy_count += 1;
                        }
                    }
                    println!("checked {}: {healthy_count} healthy", peers.len());
                }
                "s" => {
                    let delivered = handle.block_on(node.network.broadcast_peer_list(None));
                    println!("peer list broadcast to {delivered} peers");
                }
                "r" => return,
                _ => println!("invalid choice"),
            }
        }
    }
}

fn show_peer_details(node: &Arc<Node>, handle: &Handle, peer: &str) {
    let status = node.network.peer_status(peer);
    println!("\npeer {peer}");
    println!(
        "status: {}",
        if node.network.is_healthy(peer) { "healthy" } else { "unhealthy" }
    );
    println!("retries: {}/3", status.retries);
    println!("last check: {}", status.last_check);
    println!("last seen: {}", status.last_seen);

    if prompt("force a re-check? (y/n): ") == "y" {
        let healthy = handle.block_on(node.network.probe_peer(peer));
        println!("probe result: {}", if healthy { "healthy" } else { "unhealthy" });
    }
}

fn view_mempool(node: &Arc<Node>) {
    let size = node.mempool.size();
    println!("pending transactions: {size}");
    if size == 0 {
        return;
    }
    println!("most recent:");
    let transactions = node.mempool.transactions();
    for tx in transactions.iter().rev().take(5) {
        println!(
            "  {}...: {}... -> {}... ({})",
            short(&tx.txid, 16),
            short(&tx.sender, 8),
            short(&tx.recipient, 8),
            tx.amount
        );
    }
}

fn resolve_conflicts(node: &Arc<Node>, handle: &Handle) {
    println!("looking for the longest valid chain...");
    let replaced = handle.block_on(sync::resolve_conflicts(node));
    if replaced {
        let height = handle.block_on(async { node.chain.read().await.height() });
        println!("chain replaced, new height: {height}");
    } else {
        println!("the local chain is authoritative");
    }
}

fn toggle_auto_mining(node: &Arc<Node>) {
    let enabled = node.mining.toggle();
    println!(
        "auto-mining {}",
        if enabled { "enabled" } else { "disabled" }
    );
}

fn switch_mining_mode(node: &Arc<Node>) {
    println!("1. transaction-driven (mine only when the mempool has work)");
    println!("2. continuous (also mine empty blocks when the chain is quiet)");
    println!("3. disabled");
    match prompt("choose a mode (1-3): ").as_str() {
        "1" => node.mining.set_mode(MiningMode::TransactionDriven),
        "2" => node.mining.set_mode(MiningMode::Continuous),
        "3" => node.mining.set_mode(MiningMode::Disabled),
        _ => {
            println!("invalid choice");
            return;
        }
    }
    println!("mining mode is now {}", node.mining.mode().as_str());
}
