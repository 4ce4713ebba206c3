//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for all gateway components:
//! - Broker publish/subscribe
//! - Supervised worker execution
//! - Dispatcher routing
//! - Chain step execution
//! - Circuit breaker state
//!
//! # Example
//!
//! ```rust,no_run
//! use gateway_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Initialize metrics and start the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns error if metrics exporter cannot be installed or server cannot bind.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this will fail
    /// with `MetricsError::Install`. In production, ensure this is only called once.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Broker Metrics
    describe_counter!(
        "broker_messages_published_total",
        "Total number of messages published to a broker topic"
    );
    describe_counter!(
        "broker_messages_consumed_total",
        "Total number of messages consumed from a broker subscription"
    );
    describe_counter!(
        "broker_publish_errors_total",
        "Total number of publish errors"
    );
    describe_counter!(
        "broker_consume_errors_total",
        "Total number of consume/subscription errors"
    );
    describe_histogram!(
        "broker_publish_duration_seconds",
        "Time taken to publish a message"
    );

    // Worker Metrics
    describe_counter!(
        "worker_spawned_total",
        "Total number of supervised workers spawned"
    );
    describe_counter!(
        "worker_completed_total",
        "Total number of workers that reached the Completed phase"
    );
    describe_counter!(
        "worker_failed_total",
        "Total number of workers that reached the Failed phase"
    );
    describe_counter!(
        "worker_timed_out_total",
        "Total number of workers that reached the TimedOut phase"
    );
    describe_histogram!(
        "worker_execution_duration_seconds",
        "Wall-clock duration from construct start to terminal phase"
    );

    // Dispatcher Metrics
    describe_counter!(
        "dispatcher_requests_routed_total",
        "Total number of requests successfully routed to a handler"
    );
    describe_counter!(
        "dispatcher_requests_rejected_total",
        "Total number of requests rejected before a handler was resolved"
    );
    describe_counter!(
        "dispatcher_forwarded_total",
        "Total number of executions forwarded to a cluster peer"
    );
    describe_histogram!(
        "dispatcher_routing_duration_seconds",
        "Time taken to resolve a request to a handler"
    );

    // Chain Metrics
    describe_counter!(
        "chain_steps_executed_total",
        "Total number of chain steps executed"
    );
    describe_counter!(
        "chain_steps_failed_total",
        "Total number of chain steps that failed"
    );
    describe_histogram!(
        "chain_step_duration_seconds",
        "Time taken to execute one chain step"
    );

    // Circuit Breaker Metrics
    describe_gauge!(
        "circuit_breaker_state",
        "Current circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "circuit_breaker_calls_total",
        "Total number of calls through circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_successes_total",
        "Total number of successful calls"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Total number of failed calls"
    );
    describe_counter!(
        "circuit_breaker_rejections_total",
        "Total number of rejected calls (circuit open)"
    );

    // Retry Metrics
    describe_counter!(
        "retry_attempts_total",
        "Total number of retry attempts"
    );
    describe_counter!(
        "retry_successes_total",
        "Total number of successful retries"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Total number of retry attempts that exhausted max retries"
    );
}

/// Broker transport metrics recorder.
pub struct BrokerMetrics;

impl BrokerMetrics {
    /// Record a message publish.
    pub fn record_publish(duration: Duration) {
        counter!("broker_messages_published_total").increment(1);
        histogram!("broker_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a message consumption.
    pub fn record_consume() {
        counter!("broker_messages_consumed_total").increment(1);
    }

    /// Record a publish error.
    pub fn record_publish_error() {
        counter!("broker_publish_errors_total").increment(1);
    }

    /// Record a consume error.
    pub fn record_consume_error() {
        counter!("broker_consume_errors_total").increment(1);
    }
}

/// Supervised worker metrics recorder.
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Record a worker spawn.
    pub fn record_spawned() {
        counter!("worker_spawned_total").increment(1);
    }

    /// Record a worker reaching a terminal phase.
    pub fn record_terminal(phase: crate::worker::TerminalOutcome, duration: Duration) {
        match phase {
            crate::worker::TerminalOutcome::Completed => {
                counter!("worker_completed_total").increment(1);
            }
            crate::worker::TerminalOutcome::Failed | crate::worker::TerminalOutcome::Stopped => {
                counter!("worker_failed_total").increment(1);
            }
            crate::worker::TerminalOutcome::TimedOut => {
                counter!("worker_timed_out_total").increment(1);
            }
        }
        histogram!("worker_execution_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Dispatcher metrics recorder.
pub struct DispatcherMetrics;

impl DispatcherMetrics {
    /// Record a successfully routed request.
    pub fn record_routed(duration: Duration) {
        counter!("dispatcher_requests_routed_total").increment(1);
        histogram!("dispatcher_routing_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a rejected request.
    pub fn record_rejected() {
        counter!("dispatcher_requests_rejected_total").increment(1);
    }

    /// Record a cluster forward.
    pub fn record_forwarded() {
        counter!("dispatcher_forwarded_total").increment(1);
    }
}

/// Chain execution metrics recorder.
pub struct ChainMetrics;

impl ChainMetrics {
    /// Record a chain step execution.
    pub fn record_step(duration: Duration) {
        counter!("chain_steps_executed_total").increment(1);
        histogram!("chain_step_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a chain step failure.
    pub fn record_step_failure() {
        counter!("chain_steps_failed_total").increment(1);
    }
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(state: f64) {
        gauge!("circuit_breaker_state").set(state);
    }

    /// Record a call attempt.
    pub fn record_call() {
        counter!("circuit_breaker_calls_total").increment(1);
    }

    /// Record a successful call.
    pub fn record_success() {
        counter!("circuit_breaker_successes_total").increment(1);
    }

    /// Record a failed call.
    pub fn record_failure() {
        counter!("circuit_breaker_failures_total").increment(1);
    }

    /// Record a rejected call (circuit open).
    pub fn record_rejection() {
        counter!("circuit_breaker_rejections_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_start() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);

        let result = server.start();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_broker_metrics() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        BrokerMetrics::record_publish(Duration::from_millis(50));
        BrokerMetrics::record_consume();

        if let Some(rendered) = server.render() {
            assert!(rendered.contains("broker_messages_published_total"));
            assert!(rendered.contains("broker_messages_consumed_total"));
        }
    }

    #[tokio::test]
    async fn test_worker_metrics() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        WorkerMetrics::record_spawned();
        WorkerMetrics::record_terminal(crate::worker::TerminalOutcome::Completed, Duration::from_millis(200));

        if let Some(rendered) = server.render() {
            assert!(rendered.contains("worker_spawned_total"));
            assert!(rendered.contains("worker_completed_total"));
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_metrics() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        CircuitBreakerMetrics::record_state(0.0); // Closed
        CircuitBreakerMetrics::record_call();
        CircuitBreakerMetrics::record_success();

        if let Some(rendered) = server.render() {
            assert!(rendered.contains("circuit_breaker_state"));
            assert!(rendered.contains("circuit_breaker_calls_total"));
        }
    }
}
