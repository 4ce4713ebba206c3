//! Fan-out across every configured broker subscription and every listener
//! registered against a topic (spec §3 C2, §4.2).
//!
//! One ingestion pipeline may need to watch several brokers (a Kafka topic
//! and a filesystem drop directory feeding the same `request_type`, say) and
//! one topic may have more than one interested listener (the ingester and a
//! debug tap, for instance). `CompositeSubscriber` owns the fan-out: it
//! multiplexes every underlying [`Subscriber`]'s delivery stream into one
//! channel per registered listener, copying each envelope so that one slow
//! listener can't block another.
//!
//! A topic with no listeners left is torn down: its key is dropped from the
//! registry and every broker subscriber currently driving it is told to
//! `unsubscribe`, so an idle topic doesn't keep consuming broker resources.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gateway_core::broker::{Envelope, Subscriber};
use gateway_core::error::Result;
use tokio::sync::{mpsc, RwLock};

/// A listener's inbound channel, keyed by an opaque listener id chosen by
/// the caller (e.g. an ingester's channel id).
type Listeners = HashMap<String, mpsc::Sender<Envelope>>;

/// Fans a set of underlying broker subscriptions out to any number of
/// registered listeners per topic.
///
/// Cloning shares the same registry; cheap, intended to be handed to every
/// component that needs to observe broker traffic.
#[derive(Clone, Default)]
pub struct CompositeSubscriber {
    listeners: Arc<RwLock<HashMap<String, Listeners>>>,
    subscribers: Arc<RwLock<HashMap<String, Vec<Arc<dyn Subscriber>>>>>,
}

impl CompositeSubscriber {
    /// Build an empty composite subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener_id` to receive a copy of every envelope that
    /// arrives on `topic` through any broker this composite is driving.
    /// Returns the receiving half; the sender lives inside this composite.
    pub async fn add_listener(&self, topic: &str, listener_id: &str) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(256);
        let mut listeners = self.listeners.write().await;
        listeners.entry(topic.to_string()).or_default().insert(listener_id.to_string(), tx);
        rx
    }

    /// Remove `listener_id` from `topic`. Returns `true` if it was
    /// registered. If this was the topic's last listener, the topic is torn
    /// down: its entry is dropped and every broker subscriber driving it is
    /// told to `unsubscribe`.
    pub async fn remove_listener(&self, topic: &str, listener_id: &str) -> bool {
        let removed = {
            let mut listeners = self.listeners.write().await;
            let Some(by_topic) = listeners.get_mut(topic) else {
                return false;
            };
            let removed = by_topic.remove(listener_id).is_some();
            if by_topic.is_empty() {
                listeners.remove(topic);
            }
            removed
        };
        if removed {
            self.unsubscribe_if_idle(topic).await;
        }
        removed
    }

    /// Remove every listener registered against `topic`, tearing the topic
    /// down the same way [`CompositeSubscriber::remove_listener`] does when
    /// it empties the last one. Returns how many listeners were removed.
    pub async fn remove_all_listeners(&self, topic: &str) -> usize {
        let count = {
            let mut listeners = self.listeners.write().await;
            listeners.remove(topic).map_or(0, |by_topic| by_topic.len())
        };
        if count > 0 {
            self.unsubscribe_if_idle(topic).await;
        }
        count
    }

    /// Remove `listener_id` from every topic it's registered against.
    /// Returns the set of topics it was removed from.
    pub async fn remove_listener_everywhere(&self, listener_id: &str) -> HashSet<String> {
        let (touched, emptied) = {
            let mut listeners = self.listeners.write().await;
            let mut touched = HashSet::new();
            let mut emptied = Vec::new();
            for (topic, by_topic) in listeners.iter_mut() {
                if by_topic.remove(listener_id).is_some() {
                    touched.insert(topic.clone());
                    if by_topic.is_empty() {
                        emptied.push(topic.clone());
                    }
                }
            }
            for topic in &emptied {
                listeners.remove(topic);
            }
            (touched, emptied)
        };
        for topic in &emptied {
            self.unsubscribe_if_idle(topic).await;
        }
        touched
    }

    /// Every topic with at least one registered listener.
    pub async fn get_active_topics(&self) -> Vec<String> {
        self.listeners.read().await.keys().cloned().collect()
    }

    /// Tear everything down: unsubscribe every broker subscriber from every
    /// topic it's driving and drop all listener registrations. Intended for
    /// graceful shutdown.
    pub async fn shutdown(&self) {
        let drivers: HashMap<String, Vec<Arc<dyn Subscriber>>> = self.subscribers.write().await.drain().collect();
        for (topic, subscribers) in drivers {
            for subscriber in subscribers {
                if let Err(err) = subscriber.unsubscribe(&topic).await {
                    tracing::warn!(topic, error = %err, "failed to unsubscribe during shutdown");
                }
            }
        }
        self.listeners.write().await.clear();
    }

    /// Unsubscribe every broker subscriber driving `topic` if no listener is
    /// registered for it anymore.
    async fn unsubscribe_if_idle(&self, topic: &str) {
        if self.listeners.read().await.contains_key(topic) {
            return;
        }
        let mut subscribers = self.subscribers.write().await;
        let Some(drivers) = subscribers.remove(topic) else {
            return;
        };
        for subscriber in drivers {
            if let Err(err) = subscriber.unsubscribe(topic).await {
                tracing::warn!(topic, error = %err, "failed to unsubscribe idle topic");
            }
        }
    }

    /// Drive a single [`Subscriber`]'s delivery loop, fanning every envelope
    /// it yields out to the listeners registered for that envelope's topic.
    /// Runs until the subscriber's `recv` returns `Ok(None)` or errors.
    ///
    /// Intended to be spawned once per underlying broker subscription.
    pub async fn drive(&self, subscriber: Arc<dyn Subscriber>, topic: &str) -> Result<()> {
        subscriber.subscribe(topic).await?;
        self.subscribers.write().await.entry(topic.to_string()).or_default().push(Arc::clone(&subscriber));
        loop {
            match subscriber.recv().await {
                Ok(Some(envelope)) => self.fan_out(envelope).await,
                Ok(None) => return Ok(()),
                Err(err) => {
                    tracing::warn!(topic, error = %err, "broker subscription recv failed");
                    return Err(err);
                }
            }
        }
    }

    async fn fan_out(&self, envelope: Envelope) {
        let listeners = self.listeners.read().await;
        let Some(by_topic) = listeners.get(&envelope.topic) else {
            return;
        };
        // Snapshot the current listener set so a slow or closed listener
        // channel can't hold the shared read lock across backpressure.
        let senders: Vec<_> = by_topic.values().cloned().collect();
        drop(listeners);

        for sender in senders {
            if sender.send(envelope.clone()).await.is_err() {
                tracing::debug!(topic = %envelope.topic, "listener channel closed, dropping from fan-out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::error::GatewayError;
    use tokio::sync::Mutex;

    struct OnceSubscriber {
        queue: Mutex<Vec<Envelope>>,
        unsubscribed: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl Subscriber for OnceSubscriber {
        async fn subscribe(&self, _topic: &str) -> Result<()> {
            Ok(())
        }

        async fn unsubscribe(&self, _topic: &str) -> Result<()> {
            self.unsubscribed.store(true, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Envelope>> {
            let mut queue = self.queue.lock().await;
            if queue.is_empty() {
                return Err(GatewayError::Other("exhausted".to_string()));
            }
            Ok(Some(queue.remove(0)))
        }
    }

    #[tokio::test]
    async fn two_listeners_on_the_same_topic_both_receive_the_envelope() {
        let composite = CompositeSubscriber::new();
        let mut rx_a = composite.add_listener("orders", "a").await;
        let mut rx_b = composite.add_listener("orders", "b").await;

        let envelope = Envelope {
            topic: "orders".to_string(),
            payload: serde_json::json!({"order_id": 42}),
            headers: serde_json::Map::new(),
        };
        composite.fan_out(envelope.clone()).await;

        let got_a = rx_a.recv().await.expect("listener a");
        let got_b = rx_b.recv().await.expect("listener b");
        assert_eq!(got_a.topic, "orders");
        assert_eq!(got_b.topic, "orders");
    }

    #[tokio::test]
    async fn unregistered_listener_receives_nothing() {
        let composite = CompositeSubscriber::new();
        let mut rx = composite.add_listener("orders", "a").await;
        composite.remove_listener("orders", "a").await;

        composite
            .fan_out(Envelope {
                topic: "orders".to_string(),
                payload: serde_json::json!({}),
                headers: serde_json::Map::new(),
            })
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removing_the_last_listener_drops_the_topic_entirely() {
        let composite = CompositeSubscriber::new();
        let _rx = composite.add_listener("orders", "a").await;
        assert_eq!(composite.get_active_topics().await, vec!["orders".to_string()]);

        assert!(composite.remove_listener("orders", "a").await);
        assert!(composite.get_active_topics().await.is_empty());
    }

    #[tokio::test]
    async fn removing_a_listener_everywhere_reports_every_topic_it_was_on() {
        let composite = CompositeSubscriber::new();
        let _a1 = composite.add_listener("orders", "tap").await;
        let _a2 = composite.add_listener("payments", "tap").await;
        let _other = composite.add_listener("orders", "ingester").await;

        let touched = composite.remove_listener_everywhere("tap").await;
        assert_eq!(touched, HashSet::from(["orders".to_string(), "payments".to_string()]));
        assert_eq!(composite.get_active_topics().await, vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn remove_all_listeners_reports_the_count_removed() {
        let composite = CompositeSubscriber::new();
        let _a = composite.add_listener("orders", "a").await;
        let _b = composite.add_listener("orders", "b").await;

        assert_eq!(composite.remove_all_listeners("orders").await, 2);
        assert_eq!(composite.remove_all_listeners("orders").await, 0);
    }

    #[tokio::test]
    async fn emptying_a_topic_unsubscribes_every_driving_subscriber() {
        let composite = CompositeSubscriber::new();
        let unsubscribed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let subscriber: Arc<dyn Subscriber> =
            Arc::new(OnceSubscriber { queue: Mutex::new(vec![]), unsubscribed: Arc::clone(&unsubscribed) });

        let _rx = composite.add_listener("orders", "a").await;
        let driver = composite.clone();
        let driving = tokio::spawn(async move { driver.drive(subscriber, "orders").await });
        // Let `drive` register itself as a subscriber for the topic before
        // the last listener is removed.
        tokio::task::yield_now().await;

        composite.remove_listener("orders", "a").await;
        assert!(unsubscribed.load(std::sync::atomic::Ordering::Relaxed));
        let _ = driving.await;
    }

    #[tokio::test]
    async fn drive_stops_when_subscriber_is_exhausted() {
        let composite = CompositeSubscriber::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(OnceSubscriber {
            queue: Mutex::new(vec![]),
            unsubscribed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });
        let result = composite.drive(subscriber, "orders").await;
        assert!(result.is_err());
    }
}
