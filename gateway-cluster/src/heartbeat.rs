//! Periodic heartbeat exchange with seed peers (spec §4.10): on startup the
//! local node is registered, then each seed host:port is polled on a fixed
//! interval and the registry updated with the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::ClusterNode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::registry::ClusterRegistry;

/// The heartbeat request/response wire shape exchanged with
/// `POST /api/v1/cluster/heartbeat` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    /// The sender's own current snapshot.
    pub node: ClusterNode,
}

/// Drives outbound heartbeats to a fixed set of seed addresses and folds the
/// replies into a [`ClusterRegistry`].
pub struct HeartbeatService {
    registry: ClusterRegistry,
    http: reqwest::Client,
    interval: Duration,
    /// Seed address (as configured) -> node_id, once first contacted. A seed
    /// that has never replied has no registry entry to demote, so failures
    /// before first contact are simply retried on the next tick.
    resolved: Arc<Mutex<HashMap<String, String>>>,
}

impl HeartbeatService {
    /// Build a service for `registry` that polls every `interval`.
    #[must_use]
    pub fn new(registry: ClusterRegistry, interval: Duration) -> Self {
        Self { registry, http: reqwest::Client::new(), interval, resolved: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Spawn the periodic heartbeat loop over `seed_addresses`, returning a
    /// handle the caller can abort on shutdown.
    pub fn spawn(self, seed_addresses: Vec<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                for address in &seed_addresses {
                    self.beat(address).await;
                }
            }
        })
    }

    async fn beat(&self, address: &str) {
        let local = self.registry.local_snapshot().await;
        let url = format!("{}/api/v1/cluster/heartbeat", address.trim_end_matches('/'));
        let outcome = self.http.post(&url).json(&HeartbeatPayload { node: local }).send().await;

        match outcome {
            Ok(response) if response.status().is_success() => match response.json::<HeartbeatPayload>().await {
                Ok(payload) => {
                    self.resolved.lock().await.insert(address.to_string(), payload.node.node_id.clone());
                    self.registry.record_heartbeat_success(payload.node).await;
                }
                Err(error) => {
                    tracing::warn!(%address, %error, "heartbeat reply from peer was not a valid payload");
                    self.record_failure(address).await;
                }
            },
            Ok(response) => {
                tracing::warn!(%address, status = %response.status(), "heartbeat rejected by peer");
                self.record_failure(address).await;
            }
            Err(error) => {
                tracing::warn!(%address, %error, "heartbeat request failed");
                self.record_failure(address).await;
            }
        }
    }

    async fn record_failure(&self, address: &str) {
        if let Some(node_id) = self.resolved.lock().await.get(address).cloned() {
            self.registry.record_heartbeat_failure(&node_id).await;
        }
    }

    /// Handle an inbound heartbeat from a peer: merge its reported state and
    /// reply with our own snapshot.
    pub async fn handle_inbound(&self, peer: ClusterNode) -> HeartbeatPayload {
        self.registry.record_heartbeat_success(peer).await;
        HeartbeatPayload { node: self.registry.local_snapshot().await }
    }
}
