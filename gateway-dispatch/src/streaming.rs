//! Streaming Session Manager (C8, spec §4.8): admission, effective
//! TTL/channel computation, and the concurrent-session cap.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{GatewayError, Request, ResponseChannel, Result, StreamingSession};
use tokio::sync::RwLock;
use uuid::Uuid;

/// System-wide ceilings the request's and handler's own values are clamped
/// against (spec §4.8 admission).
#[derive(Debug, Clone)]
pub struct StreamingLimits {
    /// Reject admission once this many sessions are live.
    pub max_concurrent_sessions: usize,
    /// Upper bound on the effective TTL, regardless of what the request or
    /// handler ask for.
    pub system_max_ttl_minutes: f64,
    /// Used only if neither the request nor the handler name any channels.
    pub system_default_channels: Vec<ResponseChannel>,
}

impl Default for StreamingLimits {
    fn default() -> Self {
        Self { max_concurrent_sessions: 1000, system_max_ttl_minutes: 60.0, system_default_channels: vec![ResponseChannel::Rest] }
    }
}

/// Tracks live [`StreamingSession`]s, keyed by the request that opened them,
/// and enforces the concurrent-session cap (spec §4.8).
#[derive(Clone, Default)]
pub struct StreamingSessionManager {
    limits: StreamingLimits,
    sessions: Arc<RwLock<HashMap<Uuid, StreamingSession>>>,
}

impl StreamingSessionManager {
    /// Build a manager with the given system-wide limits.
    #[must_use]
    pub fn new(limits: StreamingLimits) -> Self {
        Self { limits, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Admit a session for `request`, computing the effective TTL (spec
    /// §4.8: `min(request_ttl, handler_default_ttl, system_max_ttl)`) and
    /// effective channel set (request's, else handler's default, else
    /// system default). Returns the opened session and its effective TTL in
    /// minutes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionLimitReached`] once
    /// `max_concurrent_sessions` live sessions already exist.
    pub async fn admit(
        &self,
        request: &Request,
        handler_id: String,
        handler_default_ttl_minutes: f64,
        handler_default_channels: &[ResponseChannel],
    ) -> Result<(StreamingSession, f64)> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.limits.max_concurrent_sessions {
            return Err(GatewayError::SessionLimitReached);
        }

        let effective_ttl = request.ttl_minutes.min(handler_default_ttl_minutes).min(self.limits.system_max_ttl_minutes);

        let channels: Vec<ResponseChannel> = if !request.response_channels.is_empty() {
            request.response_channels.iter().copied().collect()
        } else if !handler_default_channels.is_empty() {
            handler_default_channels.to_vec()
        } else {
            self.limits.system_default_channels.clone()
        };

        let session = StreamingSession::open(request.request_id, handler_id, channels, request.response_topic.clone());
        sessions.insert(request.request_id, session.clone());
        Ok((session, effective_ttl))
    }

    /// Reserve and return the next sequence number for `request_id`'s
    /// session, serializing concurrent updates for the same session (spec
    /// §4.8: "the publisher serializes per-session to guarantee
    /// [ascending order]").
    pub async fn take_sequence_number(&self, request_id: Uuid) -> Option<u64> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&request_id).map(StreamingSession::take_sequence_number)
    }

    /// Mark a session closed and drop it from the live set (TTL expiry,
    /// explicit stop, or handler completion — spec §3 `StreamingSession`
    /// lifecycle).
    pub async fn close(&self, request_id: Uuid) {
        self.sessions.write().await.remove(&request_id);
    }

    /// Count of currently admitted sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
