//! WebSocket delivery (spec §4.8 WebSocket channel, §6).
//!
//! # Message Protocol
//!
//! **Client → Server:**
//! ```json
//! {"type": "subscribe", "request_id": "…"}
//! {"type": "unsubscribe", "request_id": "…"}
//! ```
//!
//! **Server → Client:**
//! ```json
//! {"type": "subscribed", "request_id": "…"}
//! {"type": "unsubscribed", "request_id": "…"}
//! {"type": "event", "request_id": "…", "response": { … }}
//! {"type": "error", "message": "…"}
//! ```

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response as AxumResponse;
use futures::{SinkExt, StreamExt};
use gateway_core::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { request_id: Uuid },
    Unsubscribe { request_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Subscribed { request_id: Uuid },
    Unsubscribed { request_id: Uuid },
    Event { request_id: Uuid, response: Response },
    Error { message: String },
}

/// Upgrade to a WebSocket connection that clients use to watch one or more
/// in-flight sessions (spec §4.8: "WebSocket → pushed to every open
/// connection subscribed to the session").
#[allow(clippy::unused_async)]
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> AxumResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[allow(clippy::cognitive_complexity)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("websocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut subscribed: HashSet<Uuid> = HashSet::new();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(error) => {
                    error!(%error, "failed to serialize outgoing websocket message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        debug!("websocket send task terminated");
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => handle_client_message(&text, &state, &out_tx, &mut subscribed).await,
            Message::Close(_) => {
                info!("client requested websocket close");
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    for request_id in subscribed {
        state.ws_registry.unsubscribe(request_id).await;
    }
    send_task.abort();
    info!("websocket connection closed");
}

async fn handle_client_message(
    text: &str,
    state: &AppState,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    subscribed: &mut HashSet<Uuid>,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { request_id }) => {
            subscribed.insert(request_id);
            let mut events = state.ws_registry.subscribe(request_id).await;
            let relay_tx = out_tx.clone();
            tokio::spawn(async move {
                while let Some(response) = events.recv().await {
                    if relay_tx.send(ServerMessage::Event { request_id, response }).is_err() {
                        break;
                    }
                }
            });
            let _ = out_tx.send(ServerMessage::Subscribed { request_id });
        }
        Ok(ClientMessage::Unsubscribe { request_id }) => {
            subscribed.remove(&request_id);
            state.ws_registry.unsubscribe(request_id).await;
            let _ = out_tx.send(ServerMessage::Unsubscribed { request_id });
        }
        Err(error) => {
            warn!(%error, "failed to parse websocket message");
            let _ = out_tx.send(ServerMessage::Error { message: error.to_string() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_message_round_trips_through_json() {
        let json = r#"{"type":"subscribe","request_id":"00000000-0000-0000-0000-000000000001"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, ClientMessage::Subscribe { .. }));
    }

    #[test]
    fn event_message_serializes_with_a_tagged_type() {
        let message = ServerMessage::Subscribed { request_id: Uuid::nil() };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"subscribed""#));
    }
}
