//! SQL broker transport: a table stands in for a topic, written to by
//! `INSERT` and drained by polling (spec §4.1).
//!
//! This transport expects a table shaped as `(id BIGSERIAL, topic TEXT,
//! payload JSONB, consumed_at TIMESTAMPTZ NULL)`; the subscriber polls for
//! unconsumed rows on an interval and marks them consumed in the same
//! transaction it delivers them in, so no row is handed out twice to a
//! single subscriber instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::broker::{Envelope, Publisher, PublisherStats, Subscriber};
use gateway_core::error::{GatewayError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::{mpsc, Mutex};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const TABLE: &str = "gateway_broker_messages";

/// A Postgres-backed publisher; inserts one row per published message.
pub struct SqlPublisher {
    pool: PgPool,
    published: AtomicU64,
    failures: AtomicU64,
}

impl SqlPublisher {
    /// Connect using `connection_string` (a standard Postgres URL).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BrokerConnectionFailed`] if the pool cannot
    /// be established.
    pub async fn connect(broker_id: &str, connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
            .map_err(|e| GatewayError::BrokerConnectionFailed {
                broker_id: broker_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pool,
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Publisher for SqlPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let query = format!("INSERT INTO {TABLE} (topic, payload) VALUES ($1, $2)");
        let result = sqlx::query(&query).bind(&envelope.topic).bind(&envelope.payload).execute(&self.pool).await;

        match result {
            Ok(_) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(GatewayError::PublishFailed {
                    topic: envelope.topic,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn stats(&self) -> PublisherStats {
        let connected = !self.pool.is_closed();
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

/// A Postgres-backed subscriber, polling `gateway_broker_messages` for
/// unconsumed rows on a fixed interval.
pub struct SqlSubscriber {
    pool: PgPool,
    poll_interval: Duration,
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
}

impl SqlSubscriber {
    /// Connect using `connection_string`, polling every [`DEFAULT_POLL_INTERVAL`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BrokerConnectionFailed`] if the pool cannot
    /// be established.
    pub async fn connect(broker_id: &str, connection_string: &str) -> Result<Self> {
        Self::connect_with_interval(broker_id, connection_string, DEFAULT_POLL_INTERVAL).await
    }

    /// Connect with an explicit poll interval, overriding the default.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BrokerConnectionFailed`] if the pool cannot
    /// be established.
    pub async fn connect_with_interval(broker_id: &str, connection_string: &str, poll_interval: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
            .map_err(|e| GatewayError::BrokerConnectionFailed {
                broker_id: broker_id.to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(1000);
        Ok(Self {
            pool,
            poll_interval,
            tx,
            rx: Mutex::new(rx),
        })
    }
}

#[async_trait]
impl Subscriber for SqlSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        let pool = self.pool.clone();
        let tx = self.tx.clone();
        let owned_topic = topic.to_string();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let select_query = format!(
                    "UPDATE {TABLE} SET consumed_at = now() \
                     WHERE id IN (SELECT id FROM {TABLE} WHERE topic = $1 AND consumed_at IS NULL ORDER BY id LIMIT 100 FOR UPDATE SKIP LOCKED) \
                     RETURNING payload"
                );
                let rows = match sqlx::query(&select_query).bind(&owned_topic).fetch_all(&pool).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        tracing::warn!(topic = %owned_topic, error = %err, "sql broker poll failed");
                        continue;
                    }
                };
                for row in rows {
                    let payload: serde_json::Value = row.get("payload");
                    let envelope = Envelope {
                        topic: owned_topic.clone(),
                        payload,
                        headers: serde_json::Map::new(),
                    };
                    if tx.send(envelope).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<()> {
        // The polling task is per-subscribe-call and has no external
        // handle to cancel; it stops once the receiver side is dropped.
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Envelope>> {
        Ok(self.rx.lock().await.recv().await)
    }
}
