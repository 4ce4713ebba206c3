//! WebSocket delivery registry (spec §4.8 WebSocket channel).
//!
//! A connection subscribes to the `request_id`s it wants streamed updates
//! for; [`WsRegistry::sink`] is the [`WebSocketSink`] the dispatcher's
//! [`gateway_dispatch::publisher::MultiChannelPublisher`] calls into when a
//! response is ready for a subscribed session.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{GatewayError, Response, Result};
use gateway_dispatch::publisher::WebSocketSink;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Maps a `request_id` to the connection currently watching it.
///
/// A session is registered once, when a client subscribes, and removed
/// either explicitly or when the connection that owns it closes.
#[derive(Clone, Default)]
pub struct WsRegistry {
    subscribers: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<Response>>>>,
}

impl WsRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `request_id`, returning the receiving half a
    /// connection task forwards onto its socket.
    pub async fn subscribe(&self, request_id: Uuid) -> mpsc::UnboundedReceiver<Response> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.insert(request_id, tx);
        rx
    }

    /// Drop interest in `request_id`, e.g. on explicit unsubscribe or
    /// connection close.
    pub async fn unsubscribe(&self, request_id: Uuid) {
        self.subscribers.write().await.remove(&request_id);
    }

    /// Build the sink [`gateway_dispatch::publisher::MultiChannelPublisher`]
    /// delivers through. A session nobody is watching is a silent no-op,
    /// not an error: the caller may have asked for WebSocket delivery and
    /// then never opened a connection.
    #[must_use]
    pub fn sink(&self) -> WebSocketSink {
        let subscribers = self.subscribers.clone();
        Arc::new(move |request_id, response| -> Result<()> {
            match subscribers.try_read() {
                Ok(map) => {
                    if let Some(tx) = map.get(&request_id) {
                        let _ = tx.send(response);
                    }
                    Ok(())
                }
                Err(_) => Err(GatewayError::ForwardingFailed(format!(
                    "websocket registry busy delivering to {request_id}"
                ))),
            }
        })
    }
}
