//! Node membership registry (spec §4.10, §4.11): tracks the local node's own
//! advertised state plus every known peer, and applies the UP/SUSPECT/DOWN
//! transition rules as heartbeats succeed or lapse.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{ClusterNode, NodeStatus};
use tokio::sync::RwLock;

/// A peer's tracked state plus bookkeeping not exposed over the wire.
#[derive(Debug, Clone)]
struct PeerEntry {
    node: ClusterNode,
    consecutive_misses: u32,
}

/// Tracks this process's own [`ClusterNode`] plus every peer learned through
/// heartbeat exchange (spec §4.10).
#[derive(Clone)]
pub struct ClusterRegistry {
    local: Arc<RwLock<ClusterNode>>,
    peers: Arc<RwLock<HashMap<String, PeerEntry>>>,
}

impl ClusterRegistry {
    /// Build a registry seeded with this process's own node snapshot.
    #[must_use]
    pub fn new(local: ClusterNode) -> Self {
        Self { local: Arc::new(RwLock::new(local)), peers: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Update the local node's reported load, for the next heartbeat/status
    /// snapshot (spec §4.11: `active_handlers`, `cpu_load`).
    pub async fn set_local_metrics(&self, active_handlers: u32, cpu_load: f64) {
        let mut local = self.local.write().await;
        local.active_handlers = active_handlers;
        local.cpu_load = cpu_load;
        local.last_heartbeat = chrono::Utc::now();
    }

    /// Snapshot of the local node as it should be advertised in the next
    /// outgoing heartbeat.
    pub async fn local_snapshot(&self) -> ClusterNode {
        self.local.read().await.clone()
    }

    /// Mark the local node as gracefully departing (spec §4.10: "Any →
    /// LEAVING on explicit shutdown notice").
    pub async fn mark_local_leaving(&self) {
        self.local.write().await.status = NodeStatus::Leaving;
    }

    /// Record a successful heartbeat exchange with `peer`: resets its miss
    /// counter and brings it to `UP`, unless it reported its own departure
    /// (spec §4.10: "Any lower state → UP on a fresh heartbeat reply").
    pub async fn record_heartbeat_success(&self, mut peer: ClusterNode) {
        if peer.status != NodeStatus::Leaving {
            peer.status = NodeStatus::Up;
        }
        peer.last_heartbeat = chrono::Utc::now();
        let node_id = peer.node_id.clone();
        self.peers.write().await.insert(node_id, PeerEntry { node: peer, consecutive_misses: 0 });
    }

    /// Record a missed heartbeat for an already-known peer, applying the
    /// UP → SUSPECT → DOWN transition (spec §4.10: one miss demotes to
    /// `SUSPECT`; three consecutive misses demote to `DOWN`).
    pub async fn record_heartbeat_failure(&self, node_id: &str) {
        let mut peers = self.peers.write().await;
        if let Some(entry) = peers.get_mut(node_id) {
            if entry.node.status == NodeStatus::Leaving {
                return;
            }
            entry.consecutive_misses += 1;
            entry.node.status = if entry.consecutive_misses >= 3 { NodeStatus::Down } else { NodeStatus::Suspect };
        }
    }

    /// All known peers (excludes the local node).
    pub async fn peers(&self) -> Vec<ClusterNode> {
        self.peers.read().await.values().map(|entry| entry.node.clone()).collect()
    }

    /// Every node this registry knows about, local node first.
    pub async fn all_nodes(&self) -> Vec<ClusterNode> {
        let mut nodes = vec![self.local_snapshot().await];
        nodes.extend(self.peers().await);
        nodes
    }

    /// Look up one peer by id, mainly for the incoming heartbeat handler to
    /// merge reported state.
    pub async fn peer(&self, node_id: &str) -> Option<ClusterNode> {
        self.peers.read().await.get(node_id).map(|entry| entry.node.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::NodeRole;

    fn node(id: &str, status: NodeStatus) -> ClusterNode {
        ClusterNode { node_id: id.to_string(), address: format!("http://{id}"), role: NodeRole::Both, status, active_handlers: 0, cpu_load: 0.0, last_heartbeat: chrono::Utc::now() }
    }

    #[tokio::test]
    async fn successful_heartbeat_brings_a_peer_to_up() {
        let registry = ClusterRegistry::new(node("local", NodeStatus::Up));
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Up)).await;
        let peer = registry.peer("peer-a").await.unwrap();
        assert_eq!(peer.status, NodeStatus::Up);
    }

    #[tokio::test]
    async fn one_missed_heartbeat_demotes_to_suspect() {
        let registry = ClusterRegistry::new(node("local", NodeStatus::Up));
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Up)).await;
        registry.record_heartbeat_failure("peer-a").await;
        assert_eq!(registry.peer("peer-a").await.unwrap().status, NodeStatus::Suspect);
    }

    #[tokio::test]
    async fn three_consecutive_misses_demotes_to_down() {
        let registry = ClusterRegistry::new(node("local", NodeStatus::Up));
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Up)).await;
        registry.record_heartbeat_failure("peer-a").await;
        registry.record_heartbeat_failure("peer-a").await;
        registry.record_heartbeat_failure("peer-a").await;
        assert_eq!(registry.peer("peer-a").await.unwrap().status, NodeStatus::Down);
    }

    #[tokio::test]
    async fn a_fresh_heartbeat_reply_recovers_a_suspect_peer() {
        let registry = ClusterRegistry::new(node("local", NodeStatus::Up));
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Up)).await;
        registry.record_heartbeat_failure("peer-a").await;
        assert_eq!(registry.peer("peer-a").await.unwrap().status, NodeStatus::Suspect);
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Up)).await;
        assert_eq!(registry.peer("peer-a").await.unwrap().status, NodeStatus::Up);
    }

    #[tokio::test]
    async fn leaving_status_is_not_overwritten_by_a_missed_heartbeat() {
        let registry = ClusterRegistry::new(node("local", NodeStatus::Up));
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Leaving)).await;
        registry.record_heartbeat_failure("peer-a").await;
        assert_eq!(registry.peer("peer-a").await.unwrap().status, NodeStatus::Leaving);
    }

    #[tokio::test]
    async fn all_nodes_includes_local_first() {
        let registry = ClusterRegistry::new(node("local", NodeStatus::Up));
        registry.record_heartbeat_success(node("peer-a", NodeStatus::Up)).await;
        let nodes = registry.all_nodes().await;
        assert_eq!(nodes[0].node_id, "local");
        assert_eq!(nodes.len(), 2);
    }
}
