//! Transport-agnostic resilience decorators (spec §4.1): wrap any concrete
//! [`Publisher`]/[`Subscriber`] with scheduled reconnect, bounded-queue
//! backpressure, and batch-mode publish, built on top of
//! `gateway_runtime`'s [`CircuitBreaker`] and [`RetryPolicy`].
//!
//! Each transport module (`kafka`, `amqp`, `filesystem`, `sql`) only knows
//! how to speak its own wire protocol; reconnection and backpressure live
//! here exactly once, and are applied uniformly by handing the transport's
//! own `connect` routine in as a factory closure.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::broker::{BrokerConfig, BrokerState, Envelope, Publisher, PublisherStats, Subscriber};
use gateway_core::error::{GatewayError, Result};
use gateway_runtime::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryPolicy};
use tokio::sync::{mpsc, RwLock};

/// A boxed, type-erased future, the common currency for connection
/// factories that close over a transport's own `connect`/`new`.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Reconnect factory for a [`Publisher`]: called with no arguments each time
/// a new connection attempt is due.
pub type PublisherFactory = Arc<dyn Fn() -> BoxFuture<Arc<dyn Publisher>> + Send + Sync>;

/// Reconnect factory for a [`Subscriber`].
pub type SubscriberFactory = Arc<dyn Fn() -> BoxFuture<Arc<dyn Subscriber>> + Send + Sync>;

/// Wraps a concrete [`Publisher`] with circuit-breaking, retry-with-backoff,
/// scheduled reconnect, bounded-queue backpressure, and optional batch-mode
/// publish (spec §4.1).
pub struct ResilientPublisher {
    broker_id: String,
    connect: PublisherFactory,
    inner: RwLock<Option<Arc<dyn Publisher>>>,
    circuit_breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    state: AtomicU8,
    closed: AtomicBool,
    reconnect_attempts: AtomicU64,
    reconnect_interval: Duration,
    published: AtomicU64,
    failures: AtomicU64,
    queue: StdMutex<VecDeque<Envelope>>,
    queue_capacity: usize,
    warning_threshold_pct: f64,
    critical_threshold_pct: f64,
    drain_resume_pct: f64,
    backpressure_active: AtomicBool,
    batch_size: usize,
    batch_flush_interval: Duration,
}

impl ResilientPublisher {
    /// Wrap `connect` (the transport's own connection routine) in a
    /// resilient publisher and start its background reconnect/batch-flush
    /// tasks. Never blocks: the initial connection attempt happens on the
    /// reconnect task, same as any later one.
    #[must_use]
    pub fn spawn(config: &BrokerConfig, connect: PublisherFactory) -> Arc<Self> {
        let this = Arc::new(Self {
            broker_id: config.broker_id.clone(),
            connect,
            inner: RwLock::new(None),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            retry_policy: RetryPolicy::default(),
            state: AtomicU8::new(BrokerState::Disconnected.as_u8()),
            closed: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_interval: Duration::from_secs(config.reconnect_interval_seconds.max(1)),
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            queue: StdMutex::new(VecDeque::new()),
            queue_capacity: config.queue_capacity.max(1),
            warning_threshold_pct: config.warning_threshold_pct,
            critical_threshold_pct: config.critical_threshold_pct,
            drain_resume_pct: config.drain_resume_pct,
            backpressure_active: AtomicBool::new(false),
            batch_size: config.batch_size.max(1),
            batch_flush_interval: Duration::from_millis(config.batch_flush_interval_ms.max(1)),
        });

        let reconnector = Arc::clone(&this);
        tokio::spawn(async move { reconnector.reconnect_loop().await });

        if this.batch_size > 1 {
            let flusher = Arc::clone(&this);
            tokio::spawn(async move { flusher.batch_flush_loop().await });
        }

        this
    }

    fn state(&self) -> BrokerState {
        BrokerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: BrokerState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Shut the publisher down: the reconnect loop exits and no further
    /// connection attempts are made.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.set_state(BrokerState::Closed);
        *self.inner.write().await = None;
    }

    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return;
            }
            if self.state() != BrokerState::Connected {
                self.set_state(BrokerState::Reconnecting);
                self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                match (self.connect)().await {
                    Ok(publisher) => {
                        *self.inner.write().await = Some(publisher);
                        self.set_state(BrokerState::Connected);
                        tracing::info!(broker_id = %self.broker_id, "broker publisher reconnected");
                        self.drain_queue_best_effort().await;
                    }
                    Err(err) => {
                        tracing::warn!(
                            broker_id = %self.broker_id,
                            error = %err,
                            "broker publisher reconnect attempt failed"
                        );
                    }
                }
            }
            tokio::time::sleep(self.reconnect_interval).await;
        }
    }

    async fn batch_flush_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.batch_flush_interval);
        loop {
            ticker.tick().await;
            if self.closed.load(Ordering::Relaxed) {
                return;
            }
            self.drain_queue_best_effort().await;
        }
    }

    /// Publish everything currently queued, a batch at a time. Stops at the
    /// first failure within a batch and leaves the remainder queued
    /// (spec §4.1 all-or-nothing: a batch either fully drains or the
    /// unsent remainder stays queued for the next attempt).
    async fn drain_queue_best_effort(&self) {
        loop {
            let batch: Vec<Envelope> = {
                let mut queue = self.queue.lock().expect("queue mutex poisoned");
                if queue.is_empty() {
                    return;
                }
                let take = self.batch_size.min(queue.len());
                queue.drain(..take).collect()
            };
            self.update_backpressure_state();

            for envelope in batch {
                if self.publish_through_inner(envelope.clone()).await.is_err() {
                    let mut queue = self.queue.lock().expect("queue mutex poisoned");
                    queue.push_front(envelope);
                    self.update_backpressure_state();
                    return;
                }
            }
        }
    }

    async fn publish_through_inner(&self, envelope: Envelope) -> Result<()> {
        let Some(publisher) = self.inner.read().await.clone() else {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::PublishFailed {
                topic: envelope.topic,
                reason: "broker not connected".to_string(),
            });
        };

        let policy = self.retry_policy.clone();
        let topic = envelope.topic.clone();
        let result = self
            .circuit_breaker
            .call(|| {
                let publisher = Arc::clone(&publisher);
                let envelope = envelope.clone();
                retry_with_backoff(policy.clone(), move || {
                    let publisher = Arc::clone(&publisher);
                    let envelope = envelope.clone();
                    async move { publisher.publish(envelope).await }
                })
            })
            .await;

        match result {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.set_state(BrokerState::Reconnecting);
                *self.inner.write().await = None;
                let reason = match err {
                    CircuitBreakerError::Open => "circuit breaker open".to_string(),
                    CircuitBreakerError::Inner(inner) => inner.to_string(),
                };
                Err(GatewayError::PublishFailed { topic, reason })
            }
        }
    }

    fn queue_depth(&self) -> usize {
        self.queue.lock().expect("queue mutex poisoned").len()
    }

    fn update_backpressure_state(&self) {
        let pct = (self.queue_depth() as f64 / self.queue_capacity as f64) * 100.0;
        let was_active = self.backpressure_active.load(Ordering::Relaxed);

        if !was_active && pct >= self.critical_threshold_pct {
            self.backpressure_active.store(true, Ordering::Relaxed);
            tracing::error!(broker_id = %self.broker_id, pct, "publish queue at critical depth");
        } else if !was_active && pct >= self.warning_threshold_pct {
            tracing::warn!(broker_id = %self.broker_id, pct, "publish queue approaching capacity");
        } else if was_active && pct <= self.drain_resume_pct {
            self.backpressure_active.store(false, Ordering::Relaxed);
            tracing::info!(broker_id = %self.broker_id, pct, "publish queue backpressure resolved");
        }
    }
}

#[async_trait]
impl Publisher for ResilientPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        if self.batch_size <= 1 {
            return self.publish_through_inner(envelope).await;
        }

        {
            let mut queue = self.queue.lock().expect("queue mutex poisoned");
            if queue.len() >= self.queue_capacity {
                return Err(GatewayError::PublishFailed {
                    topic: envelope.topic,
                    reason: "publish queue is full".to_string(),
                });
            }
            queue.push_back(envelope);
        }
        self.update_backpressure_state();
        Ok(())
    }

    fn stats(&self) -> PublisherStats {
        let state = self.state();
        PublisherStats {
            connected: state == BrokerState::Connected,
            state,
            messages_published: self.published.load(Ordering::Relaxed),
            publish_failures: self.failures.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Wraps a concrete [`Subscriber`] with scheduled reconnect: on connection
/// loss, every previously-subscribed topic is resubscribed once a new
/// connection is established.
pub struct ReconnectingSubscriber {
    broker_id: String,
    connect: SubscriberFactory,
    inner: RwLock<Option<Arc<dyn Subscriber>>>,
    topics: StdMutex<HashSet<String>>,
    state: AtomicU8,
    closed: AtomicBool,
    reconnect_attempts: AtomicU64,
    reconnect_interval: Duration,
    tx: mpsc::Sender<Envelope>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Envelope>>,
}

impl ReconnectingSubscriber {
    /// Wrap `connect` and start the background reconnect/pump tasks.
    #[must_use]
    pub fn spawn(config: &BrokerConfig, connect: SubscriberFactory) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let this = Arc::new(Self {
            broker_id: config.broker_id.clone(),
            connect,
            inner: RwLock::new(None),
            topics: StdMutex::new(HashSet::new()),
            state: AtomicU8::new(BrokerState::Disconnected.as_u8()),
            closed: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_interval: Duration::from_secs(config.reconnect_interval_seconds.max(1)),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        });

        let reconnector = Arc::clone(&this);
        tokio::spawn(async move { reconnector.reconnect_loop().await });

        this
    }

    fn state(&self) -> BrokerState {
        BrokerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: BrokerState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Current connection state, surfaced through `/api/v1/status`.
    #[must_use]
    pub fn connection_state(&self) -> BrokerState {
        self.state()
    }

    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return;
            }
            if self.state() != BrokerState::Connected {
                self.set_state(BrokerState::Reconnecting);
                self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                match (self.connect)().await {
                    Ok(subscriber) => {
                        let topics: Vec<String> = self.topics.lock().expect("topics mutex poisoned").iter().cloned().collect();
                        let mut resubscribed = true;
                        for topic in &topics {
                            if subscriber.subscribe(topic).await.is_err() {
                                resubscribed = false;
                                break;
                            }
                        }
                        if resubscribed {
                            *self.inner.write().await = Some(Arc::clone(&subscriber));
                            self.set_state(BrokerState::Connected);
                            tracing::info!(broker_id = %self.broker_id, "broker subscriber reconnected");
                            self.spawn_pump(subscriber);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            broker_id = %self.broker_id,
                            error = %err,
                            "broker subscriber reconnect attempt failed"
                        );
                    }
                }
            }
            tokio::time::sleep(self.reconnect_interval).await;
        }
    }

    fn spawn_pump(self: &Arc<Self>, subscriber: Arc<dyn Subscriber>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match subscriber.recv().await {
                    Ok(Some(envelope)) => {
                        if this.tx.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) | Err(_) => {
                        this.set_state(BrokerState::Reconnecting);
                        *this.inner.write().await = None;
                        return;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Subscriber for ReconnectingSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.topics.lock().expect("topics mutex poisoned").insert(topic.to_string());
        if let Some(subscriber) = self.inner.read().await.clone() {
            subscriber.subscribe(topic).await?;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.topics.lock().expect("topics mutex poisoned").remove(topic);
        if let Some(subscriber) = self.inner.read().await.clone() {
            subscriber.unsubscribe(topic).await?;
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Envelope>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_config() -> BrokerConfig {
        BrokerConfig {
            broker_id: "test-broker".to_string(),
            broker_type: gateway_core::broker::BrokerType::Filesystem,
            connection_string: "unused".to_string(),
            enabled: true,
            auto_start: true,
            reconnect_interval_seconds: 60,
            queue_capacity: 4,
            warning_threshold_pct: 70.0,
            critical_threshold_pct: 90.0,
            drain_resume_pct: 50.0,
            batch_size: 1,
            batch_flush_interval_ms: 50,
            settings: serde_json::Map::new(),
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, envelope: Envelope) -> Result<()> {
            Err(GatewayError::PublishFailed { topic: envelope.topic, reason: "always fails".to_string() })
        }

        fn stats(&self) -> PublisherStats {
            PublisherStats::default()
        }
    }

    #[tokio::test]
    async fn starts_disconnected_before_the_reconnect_task_gets_a_chance_to_run() {
        let config = test_config();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let connect: PublisherFactory = Arc::new(move || {
            attempts_clone.fetch_add(1, Ordering::Relaxed);
            Box::pin(async { Ok(Arc::new(FailingPublisher) as Arc<dyn Publisher>) })
        });

        let publisher = ResilientPublisher::spawn(&config, connect);
        let stats = publisher.stats();
        assert_eq!(stats.state, BrokerState::Disconnected);
        assert!(!stats.connected);
    }

    #[tokio::test]
    async fn publishing_while_disconnected_fails_instead_of_hanging() {
        let config = test_config();
        let connect: PublisherFactory = Arc::new(|| Box::pin(async { Ok(Arc::new(FailingPublisher) as Arc<dyn Publisher>) }));
        let publisher = ResilientPublisher::spawn(&config, connect);

        let result = publisher
            .publish(Envelope { topic: "orders".to_string(), payload: serde_json::json!({}), headers: serde_json::Map::new() })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn batching_is_disabled_below_a_batch_size_of_two() {
        let config = test_config();
        assert!(!config.batching_enabled());
    }

    #[test]
    fn broker_state_round_trips_through_its_byte_encoding() {
        for state in [BrokerState::Connected, BrokerState::Reconnecting, BrokerState::Disconnected, BrokerState::Closed] {
            assert_eq!(BrokerState::from_u8(state.as_u8()), state);
        }
    }
}
