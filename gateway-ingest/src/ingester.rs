//! Request Ingesters (C3, spec §4.3): the bridge from a broker-delivered
//! [`Envelope`] to a [`Request`] submitted against the [`Dispatcher`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gateway_core::broker::Envelope;
use gateway_core::{GatewayError, Request};
use gateway_dispatch::Dispatcher;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Point-in-time counters for one ingester (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct IngesterStats {
    /// Envelopes pulled off the broker subscription.
    pub received: u64,
    /// Requests successfully submitted to the dispatcher.
    pub submitted: u64,
    /// Submitted requests whose dispatcher call failed or timed out.
    pub failed: u64,
    /// Envelopes rejected before submission (parse/validation failure).
    pub rejected: u64,
    /// When this ingester started, if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent envelope was processed.
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    submitted: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_activity_at: RwLock<Option<DateTime<Utc>>>,
}

/// Subset of a raw inbound payload's fields the ingester inspects before
/// handing the rest through as `payload` (spec §4.3 steps 1-3).
#[derive(Debug, Deserialize)]
struct RawRequest {
    request_id: Option<Uuid>,
    request_type: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    payload: Map<String, Value>,
    delivery_destination: Option<String>,
    ttl_minutes: Option<f64>,
    #[serde(default)]
    response_channels: std::collections::BTreeSet<gateway_core::ResponseChannel>,
    response_topic: Option<String>,
}

/// Drives one broker-facing ingestion pipeline: consumes envelopes from a
/// [`gateway_brokers::CompositeSubscriber`] listener channel, normalizes
/// each into a [`Request`], and submits it to the [`Dispatcher`] with a
/// deadline of its TTL (spec §4.3).
#[derive(Clone)]
pub struct Ingester {
    id: String,
    ingester_type: String,
    default_ttl_minutes: f64,
    dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Ingester {
    /// Build an ingester identified by `id`, tagging every request it emits
    /// with `ingester_type` as `source_channel` (spec §4.3 step 4).
    #[must_use]
    pub fn new(id: impl Into<String>, ingester_type: impl Into<String>, default_ttl_minutes: f64, dispatcher: Dispatcher) -> Self {
        Self {
            id: id.into(),
            ingester_type: ingester_type.into(),
            default_ttl_minutes,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Stable identifier for this ingester instance.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The transport type this ingester reads from, used as `source_channel`.
    #[must_use]
    pub fn get_type(&self) -> &str {
        &self.ingester_type
    }

    /// `true` once [`Ingester::start`] has been called and [`Ingester::stop`]
    /// has not.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot the current counters.
    pub async fn stats(&self) -> IngesterStats {
        IngesterStats {
            received: self.counters.received.load(Ordering::Relaxed),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            started_at: *self.counters.started_at.read().await,
            last_activity_at: *self.counters.last_activity_at.read().await,
        }
    }

    /// Start consuming `receiver`, spawning the pump loop and returning its
    /// handle. Runs until the channel closes or [`Ingester::stop`] is
    /// called.
    pub async fn start(&self, mut receiver: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        self.running.store(true, Ordering::Release);
        *self.counters.started_at.write().await = Some(Utc::now());

        let this = self.clone();
        tokio::spawn(async move {
            while this.is_running() {
                match receiver.recv().await {
                    Some(envelope) => this.process_envelope(envelope).await,
                    None => break,
                }
            }
            this.running.store(false, Ordering::Release);
        })
    }

    /// Signal the pump loop to stop after its current envelope.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    async fn process_envelope(&self, envelope: Envelope) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        *self.counters.last_activity_at.write().await = Some(Utc::now());

        let request = match self.build_request(&envelope) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(ingester = %self.id, %error, "rejecting envelope");
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let ttl = std::time::Duration::from_secs_f64((request.ttl_minutes * 60.0).max(0.0));
        match tokio::time::timeout(ttl, self.dispatcher.submit(request)).await {
            Ok(response) if matches!(response.status, gateway_core::ResponseStatus::Error | gateway_core::ResponseStatus::Timeout) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn build_request(&self, envelope: &Envelope) -> Result<Request, GatewayError> {
        let raw: RawRequest = serde_json::from_value(envelope.payload.clone()).map_err(|error| GatewayError::ParseError(error.to_string()))?;

        let request_type = raw.request_type.filter(|value| !value.trim().is_empty()).ok_or_else(|| GatewayError::Rejected("missing or blank request_type".to_string()))?;
        let api_key = raw.api_key.filter(|value| !value.trim().is_empty()).ok_or_else(|| GatewayError::Rejected("missing or blank api_key".to_string()))?;

        Ok(Request {
            request_id: raw.request_id.unwrap_or_else(Uuid::new_v4),
            request_type,
            api_key,
            payload: raw.payload,
            delivery_destination: raw.delivery_destination.as_deref().map(gateway_core::DeliveryDestination::parse),
            ttl_minutes: raw.ttl_minutes.unwrap_or(self.default_ttl_minutes),
            source_channel: self.ingester_type.clone(),
            received_at: Some(Utc::now()),
            resolved_user_id: None,
            response_channels: raw.response_channels,
            response_topic: raw.response_topic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_dispatch::acl::{AclEntry, AclTable};
    use gateway_dispatch::publisher::{MultiChannelPublisher, RestBuffer};
    use gateway_dispatch::registry::HandlerRegistry;
    use gateway_dispatch::streaming::StreamingSessionManager;
    use gateway_dispatch::{DispatcherConfig};
    use gateway_core::{Handler, HandlerConfig, Response};
    use gateway_runtime::Supervisor;
    use std::collections::{HashMap, HashSet};

    struct EchoHandler;

    #[async_trait::async_trait]
    impl Handler for EchoHandler {
        async fn construct(&mut self, _config: Map<String, Value>) -> gateway_core::Result<()> {
            Ok(())
        }
        async fn execute(&mut self, request: &Request) -> gateway_core::Result<Response> {
            Ok(Response::success(request.request_id, "echo", Value::Object(request.payload.clone()), 0))
        }
        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    async fn dispatcher_with_echo() -> Dispatcher {
        let registry = HandlerRegistry::new();
        registry
            .register(
                HandlerConfig { request_type: "ECHO".to_string(), handler_identifier: "echo".to_string(), ttl_minutes: 1.0, enabled: true, config: Map::new() },
                Arc::new(|| Box::new(EchoHandler) as Box<dyn Handler>),
            )
            .await;

        let mut entries = HashMap::new();
        entries.insert("dgf-test-key-0001".to_string(), AclEntry { user_id: "tester".to_string(), allowed_request_types: HashSet::new() });

        Dispatcher::new(
            registry,
            AclTable::new(entries),
            Supervisor::new(),
            StreamingSessionManager::default(),
            MultiChannelPublisher::new(RestBuffer::new(), None, HashMap::new()),
            DispatcherConfig::default(),
        )
    }

    fn envelope(payload: Value) -> Envelope {
        Envelope { topic: "requests".to_string(), payload, headers: Map::new() }
    }

    #[tokio::test]
    async fn well_formed_envelope_is_submitted_and_counted() {
        let ingester = Ingester::new("kafka-1", "kafka", 1.0, dispatcher_with_echo().await);
        ingester.process_envelope(envelope(serde_json::json!({"request_type": "ECHO", "api_key": "dgf-test-key-0001", "payload": {"x": 1}}))).await;

        let stats = ingester.stats().await;
        assert_eq!(stats.received, 1);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.rejected, 0);
    }

    #[tokio::test]
    async fn blank_request_type_is_rejected_before_dispatch() {
        let ingester = Ingester::new("kafka-1", "kafka", 1.0, dispatcher_with_echo().await);
        ingester.process_envelope(envelope(serde_json::json!({"request_type": "", "api_key": "dgf-test-key-0001"}))).await;

        let stats = ingester.stats().await;
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.submitted, 0);
    }

    #[tokio::test]
    async fn unparseable_payload_is_rejected() {
        let ingester = Ingester::new("kafka-1", "kafka", 1.0, dispatcher_with_echo().await);
        ingester.process_envelope(envelope(serde_json::json!("not an object"))).await;

        assert_eq!(ingester.stats().await.rejected, 1);
    }

    #[tokio::test]
    async fn missing_request_id_is_assigned_fresh() {
        let ingester = Ingester::new("kafka-1", "kafka", 1.0, dispatcher_with_echo().await);
        let request = ingester.build_request(&envelope(serde_json::json!({"request_type": "ECHO", "api_key": "dgf-test-key-0001"}))).unwrap();
        assert_ne!(request.request_id, Uuid::nil());
        assert!(request.received_at.is_some());
        assert_eq!(request.source_channel, "kafka");
    }

    #[tokio::test]
    async fn unauthorized_key_counts_as_failed_not_rejected() {
        let ingester = Ingester::new("kafka-1", "kafka", 1.0, dispatcher_with_echo().await);
        ingester.process_envelope(envelope(serde_json::json!({"request_type": "ECHO", "api_key": "dgf-unknown-key"}))).await;

        let stats = ingester.stats().await;
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.failed, 1);
    }
}
