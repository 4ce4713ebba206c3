//! Supervisor: spawns workers, tracks live handles, and keeps a bounded
//! history ring of terminal states for `/api/v1/status` (spec §4.6).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gateway_core::handler::UpdateSink;
use gateway_core::{Handler, HandlerState, Request};
use tokio::sync::RwLock;

use crate::worker::{spawn_streaming_worker, spawn_worker, WorkerHandle};

/// Bound on the number of terminal snapshots retained (spec §4.6).
pub const HISTORY_MAX_SIZE: usize = 1000;

/// Bound on the age of a terminal snapshot before it's evicted, independent
/// of `HISTORY_MAX_SIZE` (spec §4.6).
pub const HISTORY_MAX_AGE: Duration = Duration::from_secs(3600);

/// Supervises every live worker in this process and retains a bounded
/// history of finished ones.
///
/// Cloning shares the same underlying registry; cheap, intended to be handed
/// to every crate that needs to spawn or query workers.
#[derive(Clone, Default)]
pub struct Supervisor {
    live: Arc<RwLock<Vec<WorkerHandle>>>,
    history: Arc<RwLock<VecDeque<HandlerState>>>,
}

impl Supervisor {
    /// Build an empty supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a new supervised worker and register it for tracking.
    pub async fn spawn(&self, handler_id: String, handler: Box<dyn Handler>, request: Request, config: serde_json::Map<String, serde_json::Value>) {
        let handle = spawn_worker(handler_id, handler, request, config);
        self.live.write().await.push(handle);
        self.reap().await;
    }

    /// Spawn a streaming-capable worker (spec §4.5 streaming, §4.8), tracked
    /// identically to a one-shot worker for history/status purposes.
    pub async fn spawn_streaming(
        &self,
        handler_id: String,
        handler: Box<dyn Handler>,
        request: Request,
        config: serde_json::Map<String, serde_json::Value>,
        sink: UpdateSink,
    ) {
        let handle = spawn_streaming_worker(handler_id, handler, request, config, sink);
        self.live.write().await.push(handle);
        self.reap().await;
    }

    /// Request cooperative cancellation of a live worker by id.
    pub async fn stop(&self, handler_id: &str) {
        let live = self.live.read().await;
        if let Some(handle) = live.iter().find(|h| h.handler_id() == handler_id) {
            handle.stop();
        }
    }

    /// Snapshot the lifecycle state of a worker, live or in history.
    pub async fn query_state(&self, handler_id: &str) -> Option<HandlerState> {
        {
            let live = self.live.read().await;
            for handle in live.iter() {
                if handle.handler_id() == handler_id {
                    return Some(handle.state().await);
                }
            }
        }
        let history = self.history.read().await;
        history.iter().find(|s| s.handler_id == handler_id).cloned()
    }

    /// Snapshot the bounded history ring, most recent last, for
    /// `GET /api/v1/status` (spec §4.6, §6).
    pub async fn history(&self) -> Vec<HandlerState> {
        self.reap().await;
        self.history.read().await.iter().cloned().collect()
    }

    /// Count of workers currently in a non-terminal phase, used for cluster
    /// load reporting (spec §4.11).
    pub async fn active_count(&self) -> usize {
        self.reap().await;
        self.live.read().await.len()
    }

    /// Move any workers that have finished into the history ring, evicting
    /// the oldest entries past `HISTORY_MAX_SIZE` or `HISTORY_MAX_AGE`.
    async fn reap(&self) {
        let mut finished = Vec::new();
        {
            let mut live = self.live.write().await;
            let mut still_running = Vec::with_capacity(live.len());
            for handle in live.drain(..) {
                let state = handle.state().await;
                if state.phase.is_terminal() {
                    finished.push(state);
                } else {
                    still_running.push(handle);
                }
            }
            *live = still_running;
        }

        if finished.is_empty() {
            return;
        }

        let mut history = self.history.write().await;
        for state in finished {
            history.push_back(state);
        }
        while history.len() > HISTORY_MAX_SIZE {
            history.pop_front();
        }
        let cutoff = Utc::now() - chrono::Duration::from_std(HISTORY_MAX_AGE).unwrap_or(chrono::Duration::zero());
        while history.front().is_some_and(|s| s.completed_at.is_some_and(|at| at < cutoff)) {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::Response;
    use uuid::Uuid;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn construct(&mut self, _config: serde_json::Map<String, serde_json::Value>) -> gateway_core::Result<()> {
            Ok(())
        }

        async fn execute(&mut self, request: &Request) -> gateway_core::Result<Response> {
            Ok(Response::success(request.request_id, "echo", serde_json::json!({}), 0))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    fn test_request() -> Request {
        Request {
            request_id: Uuid::new_v4(),
            request_type: "ECHO".to_string(),
            api_key: "dgf-test".to_string(),
            payload: serde_json::Map::new(),
            delivery_destination: None,
            ttl_minutes: 1.0,
            source_channel: "rest".to_string(),
            received_at: Some(Utc::now()),
            resolved_user_id: None,
            response_channels: Default::default(),
            response_topic: None,
        }
    }

    #[tokio::test]
    async fn spawned_worker_is_queryable_by_id() {
        let supervisor = Supervisor::new();
        supervisor.spawn("h1".to_string(), Box::new(EchoHandler), test_request(), serde_json::Map::new()).await;

        // Give the task a moment to complete.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = supervisor.query_state("h1").await;
        assert!(state.is_some());
    }

    #[tokio::test]
    async fn unknown_handler_id_returns_none() {
        let supervisor = Supervisor::new();
        assert!(supervisor.query_state("does-not-exist").await.is_none());
    }
}
