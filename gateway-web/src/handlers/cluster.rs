//! Cluster coordination endpoints (spec §4.10, §6): heartbeat exchange and
//! membership introspection.

use axum::extract::State;
use axum::Json;
use gateway_cluster::HeartbeatPayload;
use gateway_core::ClusterNode;
use serde::Serialize;

use crate::state::AppState;

/// `POST /api/v1/cluster/heartbeat`: record the caller's reported state and
/// reply with this node's own snapshot.
pub async fn heartbeat(State(state): State<AppState>, Json(payload): Json<HeartbeatPayload>) -> Json<HeartbeatPayload> {
    Json(state.heartbeat.handle_inbound(payload.node).await)
}

/// `GET /api/v1/cluster/nodes`: every known node, local node first.
pub async fn nodes(State(state): State<AppState>) -> Json<Vec<ClusterNode>> {
    Json(state.cluster.all_nodes().await)
}

/// Local node plus its current peer set, for `GET /api/v1/cluster/status`.
#[derive(Debug, Serialize)]
pub struct ClusterStatus {
    /// This node's own snapshot.
    local: ClusterNode,
    /// Every peer this node currently tracks, whatever their status.
    peers: Vec<ClusterNode>,
}

/// `GET /api/v1/cluster/status`: a summary view for dashboards/diagnostics.
pub async fn status(State(state): State<AppState>) -> Json<ClusterStatus> {
    let local = state.cluster.local_snapshot().await;
    let peers = state.cluster.peers().await;
    Json(ClusterStatus { local, peers })
}
