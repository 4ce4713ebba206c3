//! Filesystem broker transport: a watched directory stands in for a topic
//! (spec §4.1, §6 `file://` destinations).
//!
//! A published envelope is written as one JSON file per message under the
//! target directory; a subscribed directory is watched for file creation
//! events, each new file's contents parsed as the envelope payload and then
//! removed (at-most-once, local-disk delivery — there is no broker-side
//! durability here beyond the filesystem itself).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use gateway_core::broker::{Envelope, Publisher, PublisherStats, Subscriber};
use gateway_core::error::{GatewayError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};

/// Writes one JSON file per published envelope into `root/<topic>/`.
pub struct FilesystemPublisher {
    root: PathBuf,
    published: AtomicU64,
    failures: AtomicU64,
}

impl FilesystemPublisher {
    /// Root directory under which per-topic subdirectories are created.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Publisher for FilesystemPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        let dir = self.root.join(&envelope.topic);
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::PublishFailed {
                topic: envelope.topic,
                reason: err.to_string(),
            });
        }

        let file_name = format!("{}-{}.json", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(), uuid::Uuid::new_v4());
        let path = dir.join(file_name);
        let bytes = serde_json::to_vec(&envelope.payload).map_err(|e| GatewayError::PublishFailed {
            topic: envelope.topic.clone(),
            reason: e.to_string(),
        })?;

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
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
        PublisherStats {
            connected: true,
            state: gateway_core::BrokerState::Connected,
            messages_published: self.published.load(Ordering::Relaxed),
            publish_failures: self.failures.load(Ordering::Relaxed),
            queue_depth: 0,
            reconnect_attempts: 0,
        }
    }
}

/// Watches `root/<topic>/` directories for new files and yields their
/// contents as envelopes.
pub struct FilesystemSubscriber {
    root: PathBuf,
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    connected: AtomicBool,
}

impl FilesystemSubscriber {
    /// Root directory under which per-topic subdirectories are watched.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        Self {
            root: root.into(),
            tx,
            rx: Mutex::new(rx),
            watcher: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Subscriber for FilesystemSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        let dir = self.root.join(topic);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| GatewayError::SubscriptionFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        let tx = self.tx.clone();
        let owned_topic = topic.to_string();
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            if let Ok(event) = event {
                if matches!(event.kind, EventKind::Create(_)) {
                    for path in event.paths {
                        let _ = notify_tx.send(path);
                    }
                }
            }
        })
        .map_err(|e| GatewayError::SubscriptionFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive).map_err(|e| GatewayError::SubscriptionFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        *self.watcher.lock().await = Some(watcher);
        self.connected.store(true, Ordering::Relaxed);

        tokio::spawn(async move {
            while let Some(path) = notify_rx.recv().await {
                if let Some(envelope) = read_envelope(&path, &owned_topic).await {
                    if tx.send(envelope).await.is_err() {
                        break;
                    }
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        });

        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<()> {
        *self.watcher.lock().await = None;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Envelope>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

async fn read_envelope(path: &Path, topic: &str) -> Option<Envelope> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let payload = serde_json::from_slice(&bytes).ok()?;
    Some(Envelope {
        topic: topic.to_string(),
        payload,
        headers: serde_json::Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::Publisher as _;

    #[tokio::test]
    async fn publish_writes_one_file_per_message() {
        let dir = std::env::temp_dir().join(format!("dgf-fs-test-{}", uuid::Uuid::new_v4()));
        let publisher = FilesystemPublisher::new(&dir);

        publisher
            .publish(Envelope {
                topic: "orders".to_string(),
                payload: serde_json::json!({"order_id": 1}),
                headers: serde_json::Map::new(),
            })
            .await
            .expect("publish");

        let topic_dir = dir.join("orders");
        let mut entries = tokio::fs::read_dir(&topic_dir).await.expect("read_dir");
        let mut count = 0;
        while entries.next_entry().await.expect("next_entry").is_some() {
            count += 1;
        }
        assert_eq!(count, 1);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
