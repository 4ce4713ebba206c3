//! Handler configuration, lifecycle state, and the capability trait (spec §3, §4.5).

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::request::{Request, Response};

/// Declarative configuration for one `request_type → handler` binding
/// (spec §3). Loaded from `handlers/*.json`; read-only after publish to the
/// registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// The request type this config binds a handler to.
    pub request_type: String,
    /// Identifies which handler factory to construct.
    pub handler_identifier: String,
    /// Default time-to-live for workers running this handler, in minutes.
    pub ttl_minutes: f64,
    /// Whether this binding is active.
    pub enabled: bool,
    /// Opaque handler-specific configuration, passed to `construct`.
    pub config: Map<String, Value>,
}

/// Lifecycle phase of one supervised worker (spec §4.5 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerPhase {
    /// Spawned, not yet constructing.
    Queued,
    /// `construct(config)` is running.
    Constructing,
    /// `execute(request)` is running.
    Executing,
    /// Terminal: execution finished successfully.
    Completed,
    /// Terminal: `construct` or `execute` raised.
    Failed,
    /// Terminal: TTL elapsed before completion.
    TimedOut,
    /// Terminal: an explicit `stop()` was honored before completion.
    Stopped,
}

impl HandlerPhase {
    /// `true` for any of the four terminal phases (spec §4.5, §8 invariants).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut | Self::Stopped)
    }
}

/// A snapshot of one worker's lifecycle, kept in the supervisor's bounded
/// history ring (spec §3). Mutated only by the owning worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerState {
    /// Unique id of the worker/handler instance.
    pub handler_id: String,
    /// The request this worker is executing.
    pub request_id: uuid::Uuid,
    /// The request type that resolved to this handler.
    pub request_type: String,
    /// Current lifecycle phase.
    pub phase: HandlerPhase,
    /// When the worker was spawned.
    pub queued_at: DateTime<Utc>,
    /// When `construct` began, if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal phase was reached, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration from `started_at` to `completed_at`, recorded on
    /// every terminal step, success or failure (resolves spec §9 Open
    /// Question 1).
    pub duration_ms: Option<u64>,
    /// `true` iff the terminal phase is `Completed`.
    pub success: bool,
    /// Present when `phase` is `Failed` or `TimedOut`.
    pub error_message: Option<String>,
    /// Free-form handler-produced diagnostics, if any.
    pub artifacts: Option<Value>,
    /// The payload the handler was invoked with.
    pub request_payload: Map<String, Value>,
    /// The handler's response payload, once available.
    pub response_data: Option<Value>,
}

impl HandlerState {
    /// Construct the initial `Queued` snapshot for a freshly spawned worker.
    #[must_use]
    pub fn queued(handler_id: String, request: &Request) -> Self {
        Self {
            handler_id,
            request_id: request.request_id,
            request_type: request.request_type.clone(),
            phase: HandlerPhase::Queued,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            success: false,
            error_message: None,
            artifacts: None,
            request_payload: request.payload.clone(),
            response_data: None,
        }
    }

    /// Transition to a terminal phase, stamping `completed_at` and
    /// `duration_ms` unconditionally (spec §9 Open Question 1: duration is
    /// recorded on every terminal step, success or fail).
    pub fn finish(&mut self, phase: HandlerPhase, success: bool, error_message: Option<String>) {
        debug_assert!(phase.is_terminal());
        let now = Utc::now();
        self.phase = phase;
        self.success = success;
        self.error_message = error_message;
        self.completed_at = Some(now);
        let start = self.started_at.unwrap_or(self.queued_at);
        let millis = (now - start).num_milliseconds().max(0);
        self.duration_ms = Some(millis as u64);
    }
}

/// Callback a streaming handler uses to push incremental updates.
///
/// Implementations sequence-number each call (monotonic, per session,
/// starting at 1) before handing it to the multi-channel publisher.
pub type UpdateSink = std::sync::Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

/// The capability set a handler exposes (spec §4.5).
///
/// Every handler implements the base four methods. A handler that also
/// supports incremental delivery implements [`Handler::execute_streaming`];
/// one that needs to publish/subscribe directly implements
/// [`Handler::set_channel_accessor`]. Per spec §9 Open Question 2, a
/// streaming-only handler that has no meaningful one-shot `execute` should
/// return [`crate::GatewayError::StreamingOnly`] from `execute` rather than
/// silently collapsing updates through a no-op sink.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Build the handler instance from its opaque config. Strictly
    /// happens-before any call to `execute`.
    async fn construct(&mut self, config: Map<String, Value>) -> Result<()>;

    /// Run the handler to completion for one request. Strictly
    /// happens-after `construct` and happens-before `cleanup`.
    async fn execute(&mut self, request: &Request) -> Result<Response>;

    /// Run the handler in streaming mode, pushing updates through `sink`.
    /// Default implementation rejects streaming for non-streaming handlers.
    async fn execute_streaming(&mut self, request: &Request, _sink: UpdateSink) -> Result<Response> {
        Err(crate::error::GatewayError::StreamingOnly(request.request_type.clone()))
    }

    /// Cooperative cancellation: sets a flag the handler body polls. May run
    /// concurrently with `execute`, never with `construct` or `cleanup`.
    async fn stop(&mut self);

    /// Release any resources. Runs exactly once, after `execute` (or after
    /// `construct` fails), regardless of outcome.
    async fn cleanup(&mut self);

    /// `true` if this handler instance supports [`Handler::execute_streaming`].
    fn is_streaming(&self) -> bool {
        false
    }
}
