//! Kafka-compatible broker transport (Apache Kafka, Confluent Cloud,
//! Redpanda — all speak the same wire protocol via rdkafka) (spec §4.1).
//!
//! # Delivery semantics
//!
//! At-least-once delivery with manual offset commits: an offset is
//! committed only after the message has been handed to the subscriber's
//! channel, so a crash before commit causes redelivery rather than loss.
//! Downstream consumers (the ingester) must be tolerant of duplicate
//! `request_id`s.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::broker::{Envelope, Publisher, PublisherStats, Subscriber};
use gateway_core::error::{GatewayError, Result};
use gateway_runtime::metrics::BrokerMetrics;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::{mpsc, Mutex};

/// A Kafka-compatible publisher. Cheap to clone; wraps an `rdkafka`
/// `FutureProducer` internally.
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
    connected: AtomicBool,
    published: AtomicU64,
    failures: AtomicU64,
}

impl KafkaPublisher {
    /// Connect a publisher to `brokers` (comma-separated `host:port` list).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BrokerConnectionFailed`] if the producer
    /// cannot be constructed (invalid config, unreachable brokers at the
    /// TCP level for brokers that validate eagerly).
    pub fn connect(broker_id: &str, brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| GatewayError::BrokerConnectionFailed {
                broker_id: broker_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            producer,
            timeout: Duration::from_secs(5),
            connected: AtomicBool::new(true),
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let started = std::time::Instant::now();
        let payload = serde_json::to_vec(&envelope.payload).map_err(|e| GatewayError::PublishFailed {
            topic: envelope.topic.clone(),
            reason: e.to_string(),
        })?;

        let record = FutureRecord::to(&envelope.topic).payload(&payload).key(&envelope.topic);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok(_) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                BrokerMetrics::record_publish(started.elapsed());
                Ok(())
            }
            Err((err, _)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                BrokerMetrics::record_publish_error();
                Err(GatewayError::PublishFailed {
                    topic: envelope.topic,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn stats(&self) -> PublisherStats {
        let connected = self.connected.load(Ordering::Relaxed);
        PublisherStats {
            connected,
            state: if connected { gateway_core::BrokerState::Connected } else { gateway_core::BrokerState::Disconnected },
            messages_published: self.published.load(Ordering::Relaxed),
            publish_failures: self.failures.load(Ordering::Relaxed),
            queue_depth: 0,
            reconnect_attempts: 0,
        }
    }
}

/// A Kafka-compatible subscriber backed by one `StreamConsumer` task per
/// topic, multiplexed into a single channel.
pub struct KafkaSubscriber {
    brokers: String,
    consumer_group: String,
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
    subscribed: Mutex<HashSet<String>>,
}

impl KafkaSubscriber {
    /// Create a subscriber against `brokers`, consuming as `consumer_group`.
    #[must_use]
    pub fn new(brokers: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        Self {
            brokers: brokers.into(),
            consumer_group: consumer_group.into(),
            tx,
            rx: Mutex::new(rx),
            subscribed: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        {
            let mut subscribed = self.subscribed.lock().await;
            if !subscribed.insert(topic.to_string()) {
                return Ok(());
            }
        }

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| GatewayError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        consumer.subscribe(&[topic]).map_err(|e| GatewayError::SubscriptionFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        let tx = self.tx.clone();
        let owned_topic = topic.to_string();
        tokio::spawn(async move {
            use futures::StreamExt;
            use rdkafka::consumer::CommitMode;

            let mut stream = consumer.stream();
            while let Some(result) = stream.next().await {
                let Ok(message) = result else {
                    BrokerMetrics::record_consume_error();
                    continue;
                };
                let Some(payload) = message.payload() else {
                    continue;
                };
                let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
                    BrokerMetrics::record_consume_error();
                    continue;
                };
                let envelope = Envelope {
                    topic: owned_topic.clone(),
                    payload: value,
                    headers: serde_json::Map::new(),
                };
                if tx.send(envelope).await.is_err() {
                    break;
                }
                BrokerMetrics::record_consume();
                if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                    tracing::warn!(topic = %owned_topic, error = %err, "failed to commit kafka offset");
                }
            }
        });

        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.subscribed.lock().await.remove(topic);
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Envelope>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_publisher_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<KafkaPublisher>();
        assert_sync::<KafkaPublisher>();
    }

    #[tokio::test]
    async fn subscribing_twice_to_the_same_topic_is_a_no_op() {
        let subscriber = Arc::new(KafkaSubscriber::new("localhost:9092", "test-group"));
        subscriber.subscribed.lock().await.insert("orders".to_string());
        assert!(subscriber.subscribe("orders").await.is_ok());
    }
}
