//! Cluster membership types (spec §3, §4.11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a cluster node is willing to do (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    /// Accepts ingestion and executes handlers.
    Both,
    /// Accepts ingestion only; forwards execution to an `Executor` peer.
    Gateway,
    /// Executes handlers only; never ingests directly.
    Executor,
}

/// Membership state of a cluster node, as tracked by every other node's
/// local registry (spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Heartbeats are current.
    Up,
    /// One heartbeat was missed; still eligible for forwarding.
    Suspect,
    /// Heartbeats have lapsed past the failure threshold.
    Down,
    /// The node announced a graceful departure.
    Leaving,
}

/// A peer's advertised state, as carried in heartbeats and exposed via
/// `/api/v1/cluster/nodes` (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Stable identifier for this node.
    pub node_id: String,
    /// Base URL other nodes use to reach it.
    pub address: String,
    /// Advertised role.
    pub role: NodeRole,
    /// Locally observed membership state.
    pub status: NodeStatus,
    /// Count of in-flight supervised workers, used for forwarding
    /// load-balancing (spec §4.11: lowest `active_handlers`, ties broken by
    /// `cpu_load`).
    pub active_handlers: u32,
    /// Most recently reported load average, `0.0..=1.0`.
    pub cpu_load: f64,
    /// Timestamp of the last heartbeat received from this node.
    pub last_heartbeat: DateTime<Utc>,
}

impl ClusterNode {
    /// `true` once a node has missed enough heartbeats to be excluded from
    /// forwarding consideration.
    #[must_use]
    pub fn is_forwarding_candidate(&self) -> bool {
        matches!(self.status, NodeStatus::Up | NodeStatus::Suspect) && matches!(self.role, NodeRole::Both | NodeRole::Executor)
    }
}
