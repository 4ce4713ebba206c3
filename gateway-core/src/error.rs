//! Shared error type for the data-gateway facade.
//!
//! Every suspending operation in this workspace (worker execution, broker
//! I/O, chain step dispatch, cluster forwarding) returns `Result<T,
//! GatewayError>`. Request-scoped failures are caught at the dispatcher
//! boundary and surfaced as a terminal [`crate::Response`]; transport-level
//! failures are logged and retried by their owning transport.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error kinds for the data-gateway facade (spec §7).
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The inbound payload could not be parsed into a `Request`.
    #[error("failed to parse request: {0}")]
    ParseError(String),

    /// `request_type` or `api_key` was missing or blank.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The API key is not authorized for the request's `request_type`.
    #[error("unauthorized")]
    Unauthorized,

    /// No handler is registered for the request's `request_type`.
    #[error("handler not found for request type '{0}'")]
    HandlerNotFound(String),

    /// A handler raised during `construct`, `execute`, or `cleanup`.
    #[error("handler error: {0}")]
    HandlerFailed(String),

    /// The worker's TTL elapsed before the handler completed.
    #[error("request timed out")]
    Timeout,

    /// A streaming handler has no non-streaming `execute` path.
    #[error("handler '{0}' is streaming-only and cannot serve a one-shot request")]
    StreamingOnly(String),

    /// The streaming session limit (`max_concurrent_sessions`) was reached.
    #[error("streaming session limit reached")]
    SessionLimitReached,

    /// A broker transport could not connect or reconnect.
    #[error("broker '{broker_id}' connection failed: {reason}")]
    BrokerConnectionFailed {
        /// The broker that failed.
        broker_id: String,
        /// Why it failed.
        reason: String,
    },

    /// A publish to a broker topic failed.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// Why it failed.
        reason: String,
    },

    /// A subscribe/unsubscribe operation failed.
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed.
        topic: String,
        /// Why it failed.
        reason: String,
    },

    /// Forwarding an execution to a cluster peer failed.
    #[error("forwarding failed: {0}")]
    ForwardingFailed(String),

    /// A chain step failed and the chain's error strategy did not recover it.
    #[error("chain step '{step}' failed: {reason}")]
    ChainStepFailed {
        /// The step alias or index.
        step: String,
        /// Why it failed.
        reason: String,
    },

    /// The chain definition itself is invalid (e.g. no steps).
    #[error("invalid chain: {0}")]
    InvalidChain(String),

    /// A required configuration placeholder (`${key}`) had no resolution.
    #[error("unresolved configuration placeholder: {0}")]
    UnresolvedPlaceholder(String),

    /// Catch-all for errors that don't fit another kind.
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// `true` if this error kind should count as a transient, retryable
    /// transport failure rather than a terminal request-scoped failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BrokerConnectionFailed { .. } | Self::PublishFailed { .. } | Self::SubscriptionFailed { .. }
        )
    }
}
