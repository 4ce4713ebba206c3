//! Broker transport abstraction: config, envelope, and the
//! publish/subscribe traits every transport implements (spec §3, §4.1).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Which wire protocol a broker connection speaks (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerType {
    /// Apache Kafka.
    Kafka,
    /// Confluent Cloud Kafka (same wire protocol, managed auth).
    ConfluentKafka,
    /// ActiveMQ over STOMP/AMQP.
    Activemq,
    /// RabbitMQ over AMQP 0-9-1.
    Rabbitmq,
    /// IBM MQ, bridged over AMQP 1.0.
    Ibmmq,
    /// A watched directory on the local filesystem.
    Filesystem,
    /// A polled SQL table.
    Sql,
}

/// Declarative configuration for one broker connection (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Unique id for this broker connection, referenced by input/output
    /// channel configs.
    pub broker_id: String,
    /// Wire protocol.
    pub broker_type: BrokerType,
    /// Connection string, already resolved through `${key:default}`
    /// placeholders.
    pub connection_string: String,
    /// Whether this broker should be connected at all; a disabled broker is
    /// skipped during startup wiring.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the broker's subscribers should be started automatically at
    /// startup, as opposed to only on demand.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Delay between reconnect attempts after the connection is lost
    /// (spec §4.1 `RECONNECTING`).
    #[serde(default = "default_reconnect_interval_seconds")]
    pub reconnect_interval_seconds: u64,
    /// Outbound queue capacity before `publish` starts rejecting new
    /// envelopes (spec §4.1 backpressure).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Queue-depth percentage at which backpressure is first logged.
    #[serde(default = "default_warning_threshold_pct")]
    pub warning_threshold_pct: f64,
    /// Queue-depth percentage at which backpressure is escalated.
    #[serde(default = "default_critical_threshold_pct")]
    pub critical_threshold_pct: f64,
    /// Queue-depth percentage the queue must drain back below before the
    /// backpressure warning is considered resolved.
    #[serde(default = "default_drain_resume_pct")]
    pub drain_resume_pct: f64,
    /// Number of envelopes accumulated before a batch is flushed as one
    /// unit; `1` disables batching (spec §4.1 batch mode).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on how long an envelope waits in a partially-filled
    /// batch before it's flushed anyway.
    #[serde(default = "default_batch_flush_interval_ms")]
    pub batch_flush_interval_ms: u64,
    /// Opaque transport-specific settings (e.g. `sasl_mechanism`, consumer
    /// group id, poll interval).
    #[serde(default)]
    pub settings: serde_json::Map<String, Value>,
}

const fn default_true() -> bool {
    true
}

const fn default_reconnect_interval_seconds() -> u64 {
    5
}

const fn default_queue_capacity() -> usize {
    1000
}

const fn default_warning_threshold_pct() -> f64 {
    70.0
}

const fn default_critical_threshold_pct() -> f64 {
    90.0
}

const fn default_drain_resume_pct() -> f64 {
    50.0
}

const fn default_batch_size() -> usize {
    1
}

const fn default_batch_flush_interval_ms() -> u64 {
    100
}

impl BrokerConfig {
    /// `true` once `batch_size` names an actual batch (more than one
    /// envelope per flush).
    #[must_use]
    pub const fn batching_enabled(&self) -> bool {
        self.batch_size > 1
    }
}

/// Lifecycle state of a broker transport's connection (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerState {
    /// Connected and serving traffic.
    Connected,
    /// The connection was lost and a reconnect attempt is scheduled or in
    /// flight.
    Reconnecting,
    /// Never connected, or not currently attempting to connect.
    Disconnected,
    /// Deliberately closed; no further reconnect attempts will be made.
    Closed,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl BrokerState {
    /// Pack into a byte for storage in an [`std::sync::atomic::AtomicU8`].
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Connected => 0,
            Self::Reconnecting => 1,
            Self::Disconnected => 2,
            Self::Closed => 3,
        }
    }

    /// Inverse of [`BrokerState::as_u8`]; unrecognized values map to
    /// [`BrokerState::Disconnected`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connected,
            1 => Self::Reconnecting,
            3 => Self::Closed,
            _ => Self::Disconnected,
        }
    }
}

/// A message as it crosses a broker boundary, in either direction (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination or source topic/queue name.
    pub topic: String,
    /// Message body. Already JSON for brokers that carry JSON; raw text or
    /// base64 otherwise, per that transport's convention.
    pub payload: Value,
    /// Transport-specific headers (Kafka headers, AMQP properties, ...).
    #[serde(default)]
    pub headers: serde_json::Map<String, Value>,
}

/// Outbound half of a broker transport (spec §4.1).
///
/// Implementations own their own connection lifecycle, including
/// reconnection; a publish call that fails after exhausting its retry
/// policy returns [`crate::GatewayError::PublishFailed`].
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `envelope` to `topic`, creating it implicitly if the
    /// transport allows that.
    async fn publish(&self, envelope: Envelope) -> Result<()>;

    /// Point-in-time connection and throughput counters for `/api/v1/status`.
    fn stats(&self) -> PublisherStats;
}

/// Snapshot of one publisher's health, surfaced through `/api/v1/status`
/// (spec §6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PublisherStats {
    /// `true` iff the underlying connection is currently established.
    pub connected: bool,
    /// Current connection lifecycle state (spec §4.1).
    pub state: BrokerState,
    /// Total successful publishes since connection.
    pub messages_published: u64,
    /// Total publish failures, including ones later recovered by retry.
    pub publish_failures: u64,
    /// Number of envelopes currently queued awaiting publish.
    pub queue_depth: usize,
    /// Number of reconnect attempts made since the connection was first
    /// established.
    pub reconnect_attempts: u64,
}

/// Inbound half of a broker transport (spec §4.1, §4.2).
///
/// A single subscriber instance may back more than one topic; the ingester
/// multiplexes deliveries by inspecting `Envelope::topic`.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Begin consuming `topic`. Idempotent: subscribing to an already
    /// subscribed topic is a no-op.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Stop consuming `topic`. Idempotent.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Block until the next message arrives on any subscribed topic, or the
    /// subscriber is closed.
    async fn recv(&self) -> Result<Option<Envelope>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_config_round_trips_through_json() {
        let cfg = BrokerConfig {
            broker_id: "primary-kafka".to_string(),
            broker_type: BrokerType::Kafka,
            connection_string: "localhost:9092".to_string(),
            enabled: true,
            auto_start: true,
            reconnect_interval_seconds: default_reconnect_interval_seconds(),
            queue_capacity: default_queue_capacity(),
            warning_threshold_pct: default_warning_threshold_pct(),
            critical_threshold_pct: default_critical_threshold_pct(),
            drain_resume_pct: default_drain_resume_pct(),
            batch_size: default_batch_size(),
            batch_flush_interval_ms: default_batch_flush_interval_ms(),
            settings: serde_json::Map::new(),
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: BrokerConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.broker_id, cfg.broker_id);
        assert_eq!(back.broker_type, BrokerType::Kafka);
    }

    #[test]
    fn publisher_stats_default_is_disconnected() {
        let stats = PublisherStats::default();
        assert!(!stats.connected);
        assert_eq!(stats.messages_published, 0);
    }
}
