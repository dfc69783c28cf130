use chainlib::config::ChainConfig;
use chainlib::error::ChainError;
use chainlib::types::{Block, Transaction};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Wire payload of a peer-list sync broadcast.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PeerListSync {
    pub nodes: Vec<String>,
    pub message_id: String,
    pub source_node: String,
    pub timestamp: i64,
}

/// Per-peer health bookkeeping. Times are unix seconds, 0 = never.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeerStatus {
    pub retries: u32,
    pub last_check: i64,
    pub last_seen: i64,
}

struct BroadcastRecord {
    recorded_at: Instant,
    #[allow(dead_code)] // kept for operator inspection via logs
    source: String,
}

struct BroadcastStats {
    last_broadcast: Option<Instant>,
    count: u32,
    window_start: Instant,
}

/// The peer registry, health tracker, and gossip fan-out.
///
/// Structural peer mutations go through the dashmap tables; the health
/// loop and force checks read them without further locking and tolerate
/// momentarily stale views. Broadcast history and the rate-limit
/// counters sit behind their own mutex.
pub struct NetworkManager {
    self_address: String,
    known: DashSet<String>,
    healthy: DashSet<String>,
    status: DashMap<String, PeerStatus>,
    bootstrap: DashSet<String>,
    history: Mutex<HashMap<String, BroadcastRecord>>,
    stats: Mutex<BroadcastStats>,
    client: reqwest::Client,
    max_retries: u32,
}

/// Host part of a `host:port` peer address.
pub fn host_of(addr: &str) -> &str {
    addr.split(':').next().unwrap_or(addr)
}

impl NetworkManager {
    pub fn new(self_address: String) -> Self {
        NetworkManager {
            self_address,
            known: DashSet::new(),
            healthy: DashSet::new(),
            status: DashMap::new(),
            bootstrap: DashSet::new(),
            history: Mutex::new(HashMap::new()),
            stats: Mutex::new(BroadcastStats {
                last_broadcast: None,
                count: 0,
                window_start: Instant::now(),
            }),
            client: reqwest::Client::new(),
            max_retries: 3,
        }
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Register a peer. Rejects the node's own address, empty strings,
    /// and duplicates; returns whether the peer was newly inserted.
    pub fn add_peer(&self, addr: &str) -> bool {
        if addr.is_empty() || addr == self.self_address {
            return false;
        }
        self.known.insert(addr.to_string())
    }

    pub fn add_bootstrap(&self, addr: &str) {
        self.bootstrap.insert(addr.to_string());
        self.add_peer(addr);
    }

    pub fn known_peers(&self) -> Vec<String> {
        self.known.iter().map(|peer| peer.key().clone()).collect()
    }

    pub fn healthy_peers(&self) -> Vec<String> {
        self.healthy.iter().map(|peer| peer.key().clone()).collect()
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    pub fn healthy_count(&self) -> usize {
        self.healthy.len()
    }

    pub fn is_healthy(&self, addr: &str) -> bool {
        self.healthy.contains(addr)
    }

    pub fn peer_status(&self, addr: &str) -> PeerStatus {
        self.status
            .get(addr)
            .map(|status| *status.value())
            .unwrap_or_default()
    }

    /// One synchronous probe of a peer's health endpoint, updating the
    /// registry state: success resets the retry counter and marks the
    /// peer healthy; the third consecutive failure evicts it from the
    /// healthy set (never from the known set).
    pub async fn probe_peer(&self, addr: &str) -> bool {
        let config = ChainConfig::global();
        let now = chrono::Utc::now().timestamp();
        let url = format!("http://{addr}/health");

        let alive = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(config.gossip.health_timeout_secs))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(peer = addr, %error, "health probe failed");
                false
            }
        };

        let mut status = self.status.entry(addr.to_string()).or_default();
        status.last_check = now;

        if alive {
            status.retries = 0;
            status.last_seen = now;
            if self.healthy.insert(addr.to_string()) {
                info!(peer = addr, "peer is healthy");
            }
        } else {
            status.retries += 1;
            if status.retries >= self.max_retries && self.healthy.remove(addr).is_some() {
                info!(peer = addr, retries = status.retries, "peer marked unhealthy");
            }
        }
        alive
    }

    /// One sweep of the health loop: probe every known peer whose last
    /// check is older than the re-probe floor.
    pub async fn health_sweep(&self) {
        let config = ChainConfig::global();
        let floor = config.node.peer_recheck_floor_secs as i64;
        let now = chrono::Utc::now().timestamp();

        for peer in self.known_peers() {
            let last_check = self.peer_status(&peer).last_check;
            if now - last_check < floor {
                continue;
            }
            self.probe_peer(&peer).await;
        }
    }

    /// Record an inbound broadcast id. Returns false when the id was
    /// already seen within the TTL, in which case the message must be
    /// dropped without processing.
    pub fn record_broadcast(&self, message_id: &str, source: &str) -> bool {
        let config = ChainConfig::global();
        self.record_broadcast_at(
            message_id,
            source,
            Instant::now(),
            Duration::from_secs(config.gossip.broadcast_ttl_secs),
        )
    }

    fn record_broadcast_at(
        &self,
        message_id: &str,
        source: &str,
        now: Instant,
        ttl: Duration,
    ) -> bool {
        let mut history = self.history.lock().expect("BUG: history lock poisoned");
        history.retain(|_, record| now.duration_since(record.recorded_at) <= ttl);

        if history.contains_key(message_id) {
            return false;
        }
        history.insert(
            message_id.to_string(),
            BroadcastRecord {
                recorded_at: now,
                source: source.to_string(),
            },
        );
        true
    }

    /// Token bucket for the peer-list broadcast path: at most
    /// `max_broadcasts_per_minute` per rolling minute, spaced at least
    /// `broadcast_spacing_secs` apart.
    pub fn allow_broadcast_now(&self) -> bool {
        let config = ChainConfig::global();
        self.allow_broadcast_at(
            Instant::now(),
            config.gossip.max_broadcasts_per_minute,
            Duration::from_secs(config.gossip.broadcast_spacing_secs),
        )
    }

    fn allow_broadcast_at(&self, now: Instant, max_per_minute: u32, spacing: Duration) -> bool {
        let mut stats = self.stats.lock().expect("BUG: stats lock poisoned");

        if now.duration_since(stats.window_start) > Duration::from_secs(60) {
            stats.count = 0;
            stats.window_start = now;
        }

        if stats.count >= max_per_minute {
            return false;
        }
        if let Some(last) = stats.last_broadcast {
            if now.duration_since(last) < spacing {
                return false;
            }
        }

        stats.count += 1;
        stats.last_broadcast = Some(now);
        true
    }

    /// GET a JSON document from a peer with a timeout. Transport
    /// failures and non-200 responses surface as `PeerUnreachable`;
    /// whether that demotes the peer is the health loop's business,
    /// not the caller's.
    pub async fn fetch_json(
        &self,
        peer: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Value, ChainError> {
        let unreachable = || ChainError::PeerUnreachable {
            peer: peer.to_string(),
        };

        let response = self
            .client
            .get(format!("http://{peer}{path}"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|_| unreachable())?;
        if !response.status().is_success() {
            return Err(unreachable());
        }
        response.json().await.map_err(|_| unreachable())
    }

    async fn post_json<T: Serialize>(&self, url: &str, payload: &T, timeout: Duration) -> bool {
        match self
            .client
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(%url, %error, "gossip post failed");
                false
            }
        }
    }

    /// Push a transaction to every healthy peer, skipping the source
    /// host of an inbound forward.
    pub async fn broadcast_transaction(&self, tx: &Transaction, source: Option<&str>) -> usize {
        let config = ChainConfig::global();
        let timeout = Duration::from_secs(config.gossip.tx_timeout_secs);
        let mut delivered = 0;

        for peer in self.healthy_peers() {
            if let Some(source) = source {
                if host_of(&peer) == host_of(source) {
                    continue;
                }
            }
            let url = format!("http://{peer}/transaction/broadcast");
            if self.post_json(&url, tx, timeout).await {
                delivered += 1;
            }
        }

        info!(
            txid = %tx.txid,
            delivered,
            healthy = self.healthy_count(),
            "transaction gossip complete"
        );
        delivered
    }

    /// Push a block to every healthy peer, skipping the source host of
    /// an inbound forward.
    pub async fn broadcast_block(&self, block: &Block, source: Option<&str>) -> usize {
        let config = ChainConfig::global();
        let timeout = Duration::from_secs(config.gossip.block_timeout_secs);
        let mut delivered = 0;

        for peer in self.healthy_peers() {
            if let Some(source) = source {
                if host_of(&peer) == host_of(source) {
                    continue;
                }
            }
            let url = format!("http://{peer}/block/receive");
            if self.post_json(&url, block, timeout).await {
                delivered += 1;
            }
        }

        info!(
            index = block.index,
            delivered,
            healthy = self.healthy_count(),
            "block gossip complete"
        );
        delivered
    }

    /// Push the known-peer list to every healthy peer under the
    /// rate-limit budget. Each broadcast carries a fresh message id for
    /// receiver-side loop suppression; `skip` suppresses delivery back
    /// toward the host that triggered this broadcast, compared host-only
    /// like the other gossip paths.
    pub async fn broadcast_peer_list(&self, skip: Option<&str>) -> usize {
        if !self.allow_broadcast_now() {
            warn!("peer-list broadcast budget exhausted, skipping");
            return 0;
        }

        let config = ChainConfig::global();
        let timeout = Duration::from_secs(config.gossip.peer_list_timeout_secs);
        let payload = PeerListSync {
            nodes: self.known_peers(),
            message_id: uuid::Uuid::new_v4().to_string(),
            source_node: self.self_address.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        let mut delivered = 0;
        let mut skipped = 0;
        for peer in self.healthy_peers() {
            if let Some(skip) = skip {
                if host_of(&peer) == host_of(skip) {
                    skipped += 1;
                    continue;
                }
            }
            let url = format!("http://{peer}/nodes/sync");
            if self.post_json(&url, &payload, timeout).await {
                delivered += 1;
            }
        }

        info!(
            delivered,
            skipped,
            healthy = self.healthy_count(),
            "peer-list broadcast complete"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> NetworkManager {
        NetworkManager::new("127.0.0.1:5000".to_string())
    }

    #[test]
    fn test_add_peer_rejects_self_and_duplicates() {
        let network = manager();

        assert!(!network.add_peer("127.0.0.1:5000"));
        assert!(network.add_peer("127.0.0.1:5001"));
        assert!(!network.add_peer("127.0.0.1:5001"));
        assert!(!network.add_peer(""));

        assert_eq!(network.known_count(), 1);
        assert!(!network.known_peers().contains(&"127.0.0.1:5000".to_string()));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("10.0.0.1:5000"), "10.0.0.1");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[test]
    fn test_broadcast_history_suppresses_duplicates() {
        let network = manager();
        let now = Instant::now();
        let ttl = Duration::from_secs(10);

        assert!(network.record_broadcast_at("msg-1", "10.0.0.1", now, ttl));
        // Same id again: drop, state unchanged
        assert!(!network.record_broadcast_at("msg-1", "10.0.0.2", now, ttl));
        // A different id passes
        assert!(network.record_broadcast_at("msg-2", "10.0.0.1", now, ttl));
    }

    #[test]
    fn test_broadcast_history_expires_after_ttl() {
        let network = manager();
        let start = Instant::now();
        let ttl = Duration::from_secs(10);

        assert!(network.record_broadcast_at("msg-1", "10.0.0.1", start, ttl));

        // Just inside the TTL the id is still remembered
        let later = start + Duration::from_secs(9);
        assert!(!network.record_broadcast_at("msg-1", "10.0.0.1", later, ttl));

        // Past the TTL the record has been pruned
        let expired = start + Duration::from_secs(11);
        assert!(network.record_broadcast_at("msg-1", "10.0.0.1", expired, ttl));
    }

    #[test]
    fn test_rate_limit_budget_per_minute() {
        let network = manager();
        let start = Instant::now();
        let spacing = Duration::from_secs(1);

        // Ten broadcasts spaced a second apart all pass
        for i in 0..10u64 {
            let at = start + Duration::from_secs(i * 2);
            assert!(network.allow_broadcast_at(at, 10, spacing), "broadcast {i}");
        }

        // The eleventh within the same minute is refused
        let at = start + Duration::from_secs(21);
        assert!(!network.allow_broadcast_at(at, 10, spacing));

        // A fresh minute window resets the budget
        let at = start + Duration::from_secs(100);
        assert!(network.allow_broadcast_at(at, 10, spacing));
    }

    #[test]
    fn test_rate_limit_spacing() {
        let network = manager();
        let start = Instant::now();
        let spacing = Duration::from_secs(1);

        assert!(network.allow_broadcast_at(start, 10, spacing));
        // 500 ms later: too soon
        assert!(!network.allow_broadcast_at(start + Duration::from_millis(500), 10, spacing));
        // A full second later: allowed
        assert!(network.allow_broadcast_at(start + Duration::from_millis(1500), 10, spacing));
    }

    #[test]
    fn test_peer_status_defaults_for_unknown_peer() {
        let network = manager();
        let status = network.peer_status("10.0.0.9:5000");

        assert_eq!(status.retries, 0);
        assert_eq!(status.last_check, 0);
        assert_eq!(status.last_seen, 0);
        assert!(!network.is_healthy("10.0.0.9:5000"));
    }
}
