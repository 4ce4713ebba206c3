//! Cluster forwarding (spec §4.7 step 5, §4.11): relay a request to a peer
//! node over HTTP when the handler isn't registered locally, and pick which
//! peer to forward to.

use std::time::Duration;

use gateway_core::{ClusterNode, GatewayError, Request, Response, Result};

/// Bounded timeout for a cluster forward, independent of the request's own
/// TTL (spec §5: "Cluster HTTP forwarding timeout is bounded (default 30s)
/// separate from the request TTL").
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Forward `request` to `peer`'s `/api/v1/request` endpoint and relay the
/// response verbatim (spec §4.7 step 5).
///
/// # Errors
///
/// Returns [`GatewayError::ForwardingFailed`] on a transport error, a
/// non-success HTTP status, or an undecodable response body.
pub async fn forward_to_peer(client: &reqwest::Client, peer: &ClusterNode, request: &Request, timeout: Duration) -> Result<Response> {
    let url = format!("{}/api/v1/request", peer.address.trim_end_matches('/'));
    let reply = client
        .post(&url)
        .timeout(timeout)
        .json(request)
        .send()
        .await
        .map_err(|error| GatewayError::ForwardingFailed(error.to_string()))?;

    if !reply.status().is_success() {
        return Err(GatewayError::ForwardingFailed(format!("peer '{}' returned status {}", peer.node_id, reply.status())));
    }

    reply.json::<Response>().await.map_err(|error| GatewayError::ForwardingFailed(error.to_string()))
}

/// Pick the best forwarding candidate: lowest `active_handlers`, ties
/// broken by lowest `cpu_load` (spec §4.10 forwarding policy).
#[must_use]
pub fn pick_forwarding_peer(peers: &[ClusterNode]) -> Option<&ClusterNode> {
    peers
        .iter()
        .filter(|node| node.is_forwarding_candidate())
        .min_by(|a, b| a.active_handlers.cmp(&b.active_handlers).then_with(|| a.cpu_load.partial_cmp(&b.cpu_load).unwrap_or(std::cmp::Ordering::Equal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gateway_core::{NodeRole, NodeStatus};

    fn node(id: &str, status: NodeStatus, role: NodeRole, active_handlers: u32, cpu_load: f64) -> ClusterNode {
        ClusterNode {
            node_id: id.to_string(),
            address: format!("http://{id}:8080"),
            role,
            status,
            active_handlers,
            cpu_load,
            last_heartbeat: Utc::now(),
        }
    }

    #[test]
    fn picks_the_peer_with_the_fewest_active_handlers() {
        let peers = vec![
            node("a", NodeStatus::Up, NodeRole::Executor, 5, 0.1),
            node("b", NodeStatus::Up, NodeRole::Executor, 2, 0.9),
        ];
        assert_eq!(pick_forwarding_peer(&peers).unwrap().node_id, "b");
    }

    #[test]
    fn ties_on_active_handlers_are_broken_by_cpu_load() {
        let peers = vec![node("a", NodeStatus::Up, NodeRole::Both, 3, 0.8), node("b", NodeStatus::Up, NodeRole::Both, 3, 0.2)];
        assert_eq!(pick_forwarding_peer(&peers).unwrap().node_id, "b");
    }

    #[test]
    fn down_and_gateway_only_peers_are_excluded() {
        let peers = vec![node("a", NodeStatus::Down, NodeRole::Executor, 0, 0.0), node("b", NodeStatus::Up, NodeRole::Gateway, 0, 0.0)];
        assert!(pick_forwarding_peer(&peers).is_none());
    }
}
