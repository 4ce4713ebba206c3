//! The canonical `Request`/`Response` envelope (spec §3, §6).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A channel a [`Response`] (or streaming update) can be delivered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseChannel {
    /// Publish to the response topic on a Kafka-compatible broker.
    Kafka,
    /// Publish to the response topic/queue on an ActiveMQ broker.
    Activemq,
    /// Push to open WebSocket connections subscribed to the session.
    Websocket,
    /// Buffer for the terminal response of the originating REST call.
    Rest,
}

/// Parsed form of the `delivery_destination` grammar (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryDestination {
    /// `kafka://<server>/<topic>`
    Kafka {
        /// Broker connection string.
        server: String,
        /// Target topic.
        topic: String,
    },
    /// `activemq://<server>/topic/<name>` or `activemq://<server>/queue/<name>`
    Activemq {
        /// Broker connection string.
        server: String,
        /// Whether this is a topic or a queue destination.
        is_topic: bool,
        /// Destination name.
        name: String,
    },
    /// `file://<absolute-path>`
    File {
        /// Absolute filesystem path.
        path: String,
    },
    /// The bare literal `REST`.
    Rest,
    /// The bare literal `WebSocket`.
    WebSocket,
    /// Any scheme not covered above; treated as REST downstream.
    Unknown,
}

impl DeliveryDestination {
    /// Parse the `delivery_destination` grammar from spec §6.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("REST") {
            return Self::Rest;
        }
        if raw.eq_ignore_ascii_case("WebSocket") {
            return Self::WebSocket;
        }
        if let Some(rest) = raw.strip_prefix("kafka://") {
            if let Some((server, topic)) = rest.split_once('/') {
                return Self::Kafka {
                    server: server.to_string(),
                    topic: topic.to_string(),
                };
            }
            return Self::Unknown;
        }
        if let Some(rest) = raw.strip_prefix("activemq://") {
            if let Some((server, path)) = rest.split_once('/') {
                if let Some(name) = path.strip_prefix("topic/") {
                    return Self::Activemq {
                        server: server.to_string(),
                        is_topic: true,
                        name: name.to_string(),
                    };
                }
                if let Some(name) = path.strip_prefix("queue/") {
                    return Self::Activemq {
                        server: server.to_string(),
                        is_topic: false,
                        name: name.to_string(),
                    };
                }
            }
            return Self::Unknown;
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Self::File { path: path.to_string() };
        }
        Self::Unknown
    }
}

/// A canonical normalized inbound message (spec §3).
///
/// Immutable after ingestion. `resolved_user_id` and `received_at` are
/// enrichments the ingester sets exactly once before handing the request to
/// the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique in time; a colliding id is rejected by the ingester.
    pub request_id: Uuid,
    /// Names the handler to resolve via the registry.
    pub request_type: String,
    /// Credential checked against the request type's ACL.
    pub api_key: String,
    /// Opaque payload mapping, interpreted by the handler.
    pub payload: Map<String, Value>,
    /// Parsed delivery destination, if the caller supplied one.
    pub delivery_destination: Option<DeliveryDestination>,
    /// Time-to-live for the supervised worker, in minutes.
    pub ttl_minutes: f64,
    /// Which transport this request arrived over (e.g. "kafka", "rest", "chain").
    pub source_channel: String,
    /// Set exactly once by the ingester.
    pub received_at: Option<DateTime<Utc>>,
    /// Set exactly once by the dispatcher after ACL resolution.
    pub resolved_user_id: Option<String>,
    /// Channels the caller wants updates/response delivered to.
    pub response_channels: BTreeSet<ResponseChannel>,
    /// Topic to publish streaming updates to, if any.
    pub response_topic: Option<String>,
}

impl Request {
    /// `true` if the caller is asking for streaming delivery: a non-empty
    /// channel set, independent of whether the resolved handler is itself
    /// a streaming handler (spec §4.7 step 3).
    #[must_use]
    pub fn wants_streaming(&self) -> bool {
        !self.response_channels.is_empty()
    }
}

/// Outcome status of a [`Response`] (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// The handler completed successfully.
    Success,
    /// The handler raised, or routing/auth failed.
    Error,
    /// The worker's TTL elapsed before completion.
    Timeout,
    /// One or more chain steps failed but the chain still produced output.
    Partial,
    /// A non-terminal streaming update.
    StreamingUpdate,
    /// The final message in a streaming session.
    StreamingComplete,
}

/// The canonical outbound message (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Correlates back to the originating [`Request`].
    pub request_id: Uuid,
    /// Outcome of the execution.
    pub status: ResponseStatus,
    /// Handler-produced payload, present on success/partial/streaming.
    pub data: Option<Value>,
    /// Human-readable failure reason, present on error/timeout.
    pub error_message: Option<String>,
    /// Which handler produced this response, if resolution succeeded.
    pub handler_id: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// When this response was produced.
    pub timestamp: DateTime<Utc>,
    /// `true` for `StreamingUpdate`/`StreamingComplete`.
    pub is_streaming_update: bool,
    /// Monotonic per-session sequence number for streaming updates (starts at 1).
    pub sequence_number: u64,
}

impl Response {
    /// Build a non-streaming success response.
    #[must_use]
    pub fn success(request_id: Uuid, handler_id: impl Into<String>, data: Value, execution_time_ms: u64) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Success,
            data: Some(data),
            error_message: None,
            handler_id: Some(handler_id.into()),
            execution_time_ms,
            timestamp: Utc::now(),
            is_streaming_update: false,
            sequence_number: 0,
        }
    }

    /// Build a terminal error response.
    #[must_use]
    pub fn error(request_id: Uuid, status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status,
            data: None,
            error_message: Some(message.into()),
            handler_id: None,
            execution_time_ms: 0,
            timestamp: Utc::now(),
            is_streaming_update: false,
            sequence_number: 0,
        }
    }
}
