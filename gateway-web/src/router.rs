//! Route table for the HTTP/WebSocket edge (spec §6).

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{cluster, health, registry, reload, request, status, websocket};
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Build the router every spec §6 endpoint is mounted on.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/request", post(request::submit))
        .route("/api/v1/handlers", get(registry::list_handlers))
        .route("/api/v1/status", get(status::status))
        .route("/api/v1/reload", post(reload::reload))
        .route("/api/v1/health", get(health::health_check))
        .route("/api/v1/cluster/heartbeat", post(cluster::heartbeat))
        .route("/api/v1/cluster/nodes", get(cluster::nodes))
        .route("/api/v1/cluster/status", get(cluster::status))
        .route("/ws", get(websocket::handle))
        .layer(request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
