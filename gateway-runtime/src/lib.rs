//! # Gateway Runtime
//!
//! Supervised execution of handler instances: the worker task that drives
//! one `Handler` through its lifecycle under a TTL timer, and the supervisor
//! that tracks live and recently-finished workers.
//!
//! Also home to the transport-agnostic resilience primitives ([`retry`],
//! [`circuit_breaker`]) that the broker and cluster crates build
//! reconnection and heartbeat policies on top of, and the Prometheus
//! [`metrics`] surface shared across the workspace.

pub mod circuit_breaker;
pub mod metrics;
pub mod retry;
pub mod supervisor;
pub mod worker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State as CircuitState,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use supervisor::Supervisor;
pub use worker::{spawn_streaming_worker, spawn_worker, TerminalOutcome, WorkerHandle};
