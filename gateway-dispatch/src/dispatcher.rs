//! Execution Engine / Dispatcher (C7, spec §4.7): the front door every
//! request passes through — validate, resolve, route one-shot vs streaming,
//! optionally forward to a cluster peer.

use std::sync::Arc;
use std::time::Duration;

use gateway_core::handler::UpdateSink;
use gateway_core::{ClusterNode, Handler, HandlerConfig, HandlerPhase, HandlerState, Request, Response, ResponseChannel, ResponseStatus};
use gateway_runtime::Supervisor;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::acl::AclTable;
use crate::forward::{forward_to_peer, pick_forwarding_peer, DEFAULT_FORWARD_TIMEOUT};
use crate::publisher::MultiChannelPublisher;
use crate::registry::HandlerRegistry;
use crate::streaming::StreamingSessionManager;

/// How often the dispatcher polls [`Supervisor::query_state`] while waiting
/// on a one-shot worker.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration the dispatcher needs beyond its collaborators (spec §4.7,
/// §4.10).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Whether cluster bypass forwarding is attempted on a local miss.
    pub clustering_enabled: bool,
    /// This node's id, used only for logging/diagnostics.
    pub local_node_id: String,
    /// Bounded timeout for a cluster HTTP forward (spec §5).
    pub forward_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { clustering_enabled: false, local_node_id: "local".to_string(), forward_timeout: DEFAULT_FORWARD_TIMEOUT }
    }
}

/// The front door every inbound [`Request`] passes through (spec §4.7).
#[derive(Clone)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    acl: Arc<AclTable>,
    supervisor: Supervisor,
    sessions: StreamingSessionManager,
    publisher: MultiChannelPublisher,
    peers: Arc<RwLock<Vec<ClusterNode>>>,
    http: reqwest::Client,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Wire a dispatcher over its collaborators.
    #[must_use]
    pub fn new(
        registry: HandlerRegistry,
        acl: AclTable,
        supervisor: Supervisor,
        sessions: StreamingSessionManager,
        publisher: MultiChannelPublisher,
        config: DispatcherConfig,
    ) -> Self {
        Self { registry, acl: Arc::new(acl), supervisor, sessions, publisher, peers: Arc::new(RwLock::new(Vec::new())), http: reqwest::Client::new(), config }
    }

    /// Replace the set of known cluster peers, as reported by the cluster
    /// service's heartbeat exchange (spec §4.10).
    pub async fn set_peers(&self, peers: Vec<ClusterNode>) {
        *self.peers.write().await = peers;
    }

    /// The handler registry this dispatcher resolves against, for
    /// `GET /api/v1/handlers` and `POST /api/v1/reload` (spec §6).
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The supervisor driving this dispatcher's workers, for
    /// `GET /api/v1/status` (spec §6).
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// `submit(request) → Response` (spec §4.7).
    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id, request_type = %request.request_type))]
    pub async fn submit(&self, mut request: Request) -> Response {
        if request.request_type.trim().is_empty() || request.api_key.trim().is_empty() {
            return Response::error(request.request_id, ResponseStatus::Error, "request rejected: blank request_type or api_key");
        }

        let user_id = match self.acl.authorize(&request.api_key, &request.request_type) {
            Ok(user_id) => user_id,
            Err(_) => return Response::error(request.request_id, ResponseStatus::Error, "unauthorized"),
        };
        request.resolved_user_id = Some(user_id);

        let Some((handler_config, handler)) = self.registry.resolve(&request.request_type).await else {
            if self.config.clustering_enabled {
                if let Some(response) = self.try_forward(&request).await {
                    return response;
                }
            }
            return Response::error(request.request_id, ResponseStatus::Error, format!("handler not found for request type '{}'", request.request_type));
        };

        if request.wants_streaming() || handler.is_streaming() {
            self.dispatch_streaming(request, handler_config, handler).await
        } else {
            self.dispatch_one_shot(request, handler_config, handler).await
        }
    }

    async fn try_forward(&self, request: &Request) -> Option<Response> {
        let peers = self.peers.read().await.clone();
        let peer = pick_forwarding_peer(&peers)?;
        tracing::debug!(node_id = %self.config.local_node_id, peer = %peer.node_id, "forwarding request to cluster peer");
        match forward_to_peer(&self.http, peer, request, self.config.forward_timeout).await {
            Ok(response) => Some(response),
            Err(error) => Some(Response::error(request.request_id, ResponseStatus::Error, format!("forwarding failed: {error}"))),
        }
    }

    async fn dispatch_one_shot(&self, request: Request, handler_config: HandlerConfig, handler: Box<dyn Handler>) -> Response {
        let request_id = request.request_id;
        let handler_id = format!("{}-{request_id}", handler_config.handler_identifier);
        let ttl = Duration::from_secs_f64((request.ttl_minutes * 60.0).max(0.0));

        self.supervisor.spawn(handler_id.clone(), handler, request, handler_config.config).await;
        self.await_terminal_state(request_id, &handler_id, ttl).await
    }

    async fn dispatch_streaming(&self, request: Request, handler_config: HandlerConfig, handler: Box<dyn Handler>) -> Response {
        let request_id = request.request_id;
        let handler_id = format!("{}-{request_id}", handler_config.handler_identifier);
        let handler_default_channels = default_response_channels(&handler_config);

        let admission = self
            .sessions
            .admit(&request, handler_id.clone(), handler_config.ttl_minutes, &handler_default_channels)
            .await;
        let (session, effective_ttl) = match admission {
            Ok(admitted) => admitted,
            Err(error) => return Response::error(request_id, ResponseStatus::Error, error.to_string()),
        };

        let sink = self.update_sink(request_id, session.channels.clone(), session.response_topic.clone());
        let mut streaming_request = request;
        streaming_request.ttl_minutes = effective_ttl;

        self.supervisor
            .spawn_streaming(handler_id.clone(), handler, streaming_request, handler_config.config, sink)
            .await;

        let ttl = Duration::from_secs_f64((effective_ttl * 60.0).max(0.0));
        let response = self.await_terminal_state(request_id, &handler_id, ttl).await;
        self.publisher.publish(request_id, &session.channels, session.response_topic.as_deref(), response.clone()).await;
        self.sessions.close(request_id).await;
        response
    }

    fn update_sink(&self, request_id: Uuid, channels: Vec<ResponseChannel>, response_topic: Option<String>) -> UpdateSink {
        let publisher = self.publisher.clone();
        let sessions = self.sessions.clone();
        Arc::new(move |data| {
            let publisher = publisher.clone();
            let sessions = sessions.clone();
            let channels = channels.clone();
            let response_topic = response_topic.clone();
            Box::pin(async move {
                let sequence_number = sessions.take_sequence_number(request_id).await.unwrap_or(0);
                let mut update = Response::success(request_id, "streaming", data, 0);
                update.status = ResponseStatus::StreamingUpdate;
                update.is_streaming_update = true;
                update.sequence_number = sequence_number;
                publisher.publish(request_id, &channels, response_topic.as_deref(), update).await;
                Ok(())
            })
        })
    }

    async fn await_terminal_state(&self, request_id: Uuid, handler_id: &str, ttl: Duration) -> Response {
        let mut waited = Duration::ZERO;
        let grace = Duration::from_millis(250);
        loop {
            if let Some(state) = self.supervisor.query_state(handler_id).await {
                if state.phase.is_terminal() {
                    return state_to_response(request_id, &state);
                }
            }
            if waited >= ttl + grace {
                return Response::error(request_id, ResponseStatus::Timeout, "request timed out");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            waited += POLL_INTERVAL;
        }
    }
}

fn default_response_channels(handler_config: &HandlerConfig) -> Vec<ResponseChannel> {
    handler_config
        .config
        .get("default_response_channels")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

fn state_to_response(request_id: Uuid, state: &HandlerState) -> Response {
    match state.phase {
        HandlerPhase::Completed => Response {
            request_id,
            status: ResponseStatus::Success,
            data: state.response_data.clone(),
            error_message: None,
            handler_id: Some(state.handler_id.clone()),
            execution_time_ms: state.duration_ms.unwrap_or(0),
            timestamp: chrono::Utc::now(),
            is_streaming_update: false,
            sequence_number: 0,
        },
        HandlerPhase::TimedOut => {
            Response::error(request_id, ResponseStatus::Timeout, state.error_message.clone().unwrap_or_else(|| "request timed out".to_string()))
        }
        _ => Response::error(request_id, ResponseStatus::Error, state.error_message.clone().unwrap_or_else(|| "handler failed".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{GatewayError, Result};
    use std::collections::{BTreeSet, HashMap};

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn construct(&mut self, _config: serde_json::Map<String, serde_json::Value>) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, request: &Request) -> Result<Response> {
            Ok(Response::success(request.request_id, "echo", serde_json::Value::Object(request.payload.clone()), 0))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn construct(&mut self, _config: serde_json::Map<String, serde_json::Value>) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, _request: &Request) -> Result<Response> {
            Err(GatewayError::HandlerFailed("boom".to_string()))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    struct ChunkingHandler;

    #[async_trait]
    impl Handler for ChunkingHandler {
        async fn construct(&mut self, _config: serde_json::Map<String, serde_json::Value>) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, request: &Request) -> Result<Response> {
            Ok(Response::success(request.request_id, "chunking", serde_json::json!({}), 0))
        }

        async fn execute_streaming(&mut self, request: &Request, sink: UpdateSink) -> Result<Response> {
            sink(serde_json::json!({"chunk": 1})).await?;
            Ok(Response::success(request.request_id, "chunking", serde_json::json!({"chunk": 2}), 0))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}

        fn is_streaming(&self) -> bool {
            true
        }
    }

    fn handler_config(request_type: &str) -> HandlerConfig {
        HandlerConfig {
            request_type: request_type.to_string(),
            handler_identifier: request_type.to_lowercase(),
            ttl_minutes: 1.0,
            enabled: true,
            config: serde_json::Map::new(),
        }
    }

    fn request(request_type: &str, api_key: &str, response_channels: BTreeSet<ResponseChannel>) -> Request {
        Request {
            request_id: Uuid::new_v4(),
            request_type: request_type.to_string(),
            api_key: api_key.to_string(),
            payload: serde_json::Map::new(),
            delivery_destination: None,
            ttl_minutes: 1.0,
            source_channel: "rest".to_string(),
            received_at: None,
            resolved_user_id: None,
            response_channels,
            response_topic: None,
        }
    }

    async fn dispatcher_with(request_type: &str, handler: impl Fn() -> Box<dyn Handler> + Send + Sync + 'static) -> Dispatcher {
        let registry = HandlerRegistry::new();
        registry.register(handler_config(request_type), Arc::new(handler)).await;

        let mut entries = HashMap::new();
        entries.insert(
            "dgf-test-key-0001".to_string(),
            crate::acl::AclEntry { user_id: "tester".to_string(), allowed_request_types: std::collections::HashSet::new() },
        );

        Dispatcher::new(
            registry,
            AclTable::new(entries),
            Supervisor::new(),
            StreamingSessionManager::default(),
            MultiChannelPublisher::new(crate::publisher::RestBuffer::new(), None, HashMap::new()),
            DispatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn echo_request_completes_successfully() {
        let dispatcher = dispatcher_with("ECHO", || Box::new(EchoHandler)).await;
        let response = dispatcher.submit(request("ECHO", "dgf-test-key-0001", BTreeSet::new())).await;
        assert_eq!(response.status, ResponseStatus::Success);
    }

    #[tokio::test]
    async fn unauthorized_api_key_is_rejected_before_resolution() {
        let dispatcher = dispatcher_with("ECHO", || Box::new(EchoHandler)).await;
        let response = dispatcher.submit(request("ECHO", "dgf-unknown-key", BTreeSet::new())).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_message.as_deref(), Some("unauthorized"));
    }

    #[tokio::test]
    async fn missing_handler_without_clustering_returns_an_error() {
        let dispatcher = dispatcher_with("ECHO", || Box::new(EchoHandler)).await;
        let response = dispatcher.submit(request("UNKNOWN", "dgf-test-key-0001", BTreeSet::new())).await;
        assert_eq!(response.status, ResponseStatus::Error);
    }

    #[tokio::test]
    async fn failing_handler_surfaces_as_an_error_response() {
        let dispatcher = dispatcher_with("ECHO", || Box::new(FailingHandler)).await;
        let response = dispatcher.submit(request("ECHO", "dgf-test-key-0001", BTreeSet::new())).await;
        assert_eq!(response.status, ResponseStatus::Error);
    }

    #[tokio::test]
    async fn streaming_request_delivers_updates_and_a_terminal_response() {
        let dispatcher = dispatcher_with("CHUNKING", || Box::new(ChunkingHandler)).await;
        let response = dispatcher.submit(request("CHUNKING", "dgf-test-key-0001", BTreeSet::from([ResponseChannel::Rest]))).await;
        assert_eq!(response.status, ResponseStatus::Success);
    }
}
