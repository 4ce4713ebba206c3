//! Streaming session bookkeeping (spec §3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::ResponseChannel;

/// A live streaming delivery session, owned by the dispatcher for the
/// lifetime of one streaming handler execution (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSession {
    /// The request that opened this session.
    pub request_id: Uuid,
    /// The handler instance producing updates.
    pub handler_id: String,
    /// Channels updates are fanned out to.
    pub channels: Vec<ResponseChannel>,
    /// Topic updates are published to, for broker-backed channels.
    pub response_topic: Option<String>,
    /// Monotonic counter, incremented before each update is sent; starts at 1.
    pub next_sequence_number: u64,
    /// When the session was admitted.
    pub opened_at: DateTime<Utc>,
    /// `true` once the terminal `StreamingComplete` update has been sent.
    pub closed: bool,
}

impl StreamingSession {
    /// Admit a new session for `request_id` (spec §4.8 admission).
    #[must_use]
    pub fn open(request_id: Uuid, handler_id: String, channels: Vec<ResponseChannel>, response_topic: Option<String>) -> Self {
        Self {
            request_id,
            handler_id,
            channels,
            response_topic,
            next_sequence_number: 1,
            opened_at: Utc::now(),
            closed: false,
        }
    }

    /// Reserve and return the next sequence number for an outgoing update.
    pub fn take_sequence_number(&mut self) -> u64 {
        let n = self.next_sequence_number;
        self.next_sequence_number += 1;
        n
    }
}
