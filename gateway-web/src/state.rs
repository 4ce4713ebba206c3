//! Application state shared across the HTTP/WebSocket edge.

use std::sync::Arc;

use gateway_cluster::{ClusterRegistry, HeartbeatService};
use gateway_dispatch::Dispatcher;

use crate::reload::HandlerReloader;
use crate::ws::WsRegistry;

/// Everything a route handler needs: the dispatcher workers submit through,
/// the cluster's membership view, the heartbeat exchange, the WebSocket
/// delivery registry, and the reload hook the binary wired up at startup.
#[derive(Clone)]
pub struct AppState {
    /// Routes inbound requests to handlers and awaits their terminal state.
    pub dispatcher: Dispatcher,
    /// This node's view of cluster membership (spec §4.10).
    pub cluster: ClusterRegistry,
    /// Drives the outbound half of the heartbeat exchange and answers
    /// inbound ones (spec §4.10).
    pub heartbeat: Arc<HeartbeatService>,
    /// Maps subscribed `request_id`s to their open WebSocket connection.
    pub ws_registry: WsRegistry,
    /// Rebuilds the handler registry from config on demand (spec §4.4).
    pub reloader: Arc<dyn HandlerReloader>,
}

impl AppState {
    /// Assemble application state from its already-constructed parts.
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        cluster: ClusterRegistry,
        heartbeat: Arc<HeartbeatService>,
        ws_registry: WsRegistry,
        reloader: Arc<dyn HandlerReloader>,
    ) -> Self {
        Self {
            dispatcher,
            cluster,
            heartbeat,
            ws_registry,
            reloader,
        }
    }
}
