//! Multi-Channel Publisher (C9, spec §4.8 publish contract): fans one
//! [`Response`] out across every channel a session asked for. Publications
//! to different channels are independent — one failing never blocks the
//! others.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{Envelope, GatewayError, Publisher, Response, ResponseChannel, Result};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Pushes a response to every open WebSocket connection subscribed to a
/// session. Implemented by the HTTP edge; the publisher only needs to know
/// how to reach it.
pub type WebSocketSink = Arc<dyn Fn(Uuid, Response) -> Result<()> + Send + Sync>;

/// Buffers the terminal response of a one-shot REST call until the HTTP
/// handler awaiting it picks it up (spec §4.8: "REST → buffered only for
/// the terminal response").
#[derive(Clone, Default)]
pub struct RestBuffer {
    pending: Arc<Mutex<HashMap<Uuid, mpsc::Sender<Response>>>>,
}

impl RestBuffer {
    /// Build an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `request_id`'s terminal response before
    /// dispatch begins, returning the receiving end to await.
    pub async fn register(&self, request_id: Uuid) -> mpsc::Receiver<Response> {
        let (tx, rx) = mpsc::channel(1);
        self.pending.lock().await.insert(request_id, tx);
        rx
    }

    async fn deliver(&self, request_id: Uuid, response: Response) {
        if let Some(tx) = self.pending.lock().await.remove(&request_id) {
            let _ = tx.send(response).await;
        }
    }
}

/// Fans a [`Response`] out across REST/WebSocket/broker-backed channels
/// (spec §4.8). Per-session ordering is the caller's responsibility: the
/// streaming dispatch path drives each session through a single task, which
/// already serializes its `publish` calls.
#[derive(Clone)]
pub struct MultiChannelPublisher {
    rest: RestBuffer,
    websocket: Option<WebSocketSink>,
    brokers: Arc<HashMap<String, Arc<dyn Publisher>>>,
}

impl MultiChannelPublisher {
    /// Build a publisher over the given REST buffer, optional WebSocket
    /// sink, and broker publishers keyed by broker id (`"kafka"`,
    /// `"activemq"`, …).
    #[must_use]
    pub fn new(rest: RestBuffer, websocket: Option<WebSocketSink>, brokers: HashMap<String, Arc<dyn Publisher>>) -> Self {
        Self { rest, websocket, brokers: Arc::new(brokers) }
    }

    /// Deliver `response` to every channel in `channels`.
    pub async fn publish(&self, request_id: Uuid, channels: &[ResponseChannel], response_topic: Option<&str>, response: Response) {
        for channel in channels {
            let outcome = match channel {
                ResponseChannel::Rest => {
                    self.rest.deliver(request_id, response.clone()).await;
                    Ok(())
                }
                ResponseChannel::Websocket => match &self.websocket {
                    Some(sink) => sink(request_id, response.clone()),
                    None => Ok(()),
                },
                ResponseChannel::Kafka => self.publish_to_broker("kafka", response_topic, &response).await,
                ResponseChannel::Activemq => self.publish_to_broker("activemq", response_topic, &response).await,
            };
            if let Err(error) = outcome {
                tracing::warn!(%request_id, ?channel, %error, "channel publish failed");
            }
        }
    }

    async fn publish_to_broker(&self, broker_id: &str, response_topic: Option<&str>, response: &Response) -> Result<()> {
        let topic = response_topic.ok_or_else(|| GatewayError::PublishFailed {
            topic: String::new(),
            reason: "no response_topic configured for this session".to_string(),
        })?;
        let publisher = self.brokers.get(broker_id).ok_or_else(|| GatewayError::PublishFailed {
            topic: topic.to_string(),
            reason: format!("no publisher registered for broker '{broker_id}'"),
        })?;
        let payload = serde_json::to_value(response)
            .map_err(|error| GatewayError::PublishFailed { topic: topic.to_string(), reason: error.to_string() })?;
        publisher.publish(Envelope { topic: topic.to_string(), payload, headers: serde_json::Map::new() }).await
    }
}
