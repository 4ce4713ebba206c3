//! `DELAYED`: sleeps for `delay_ms` before responding, used to exercise TTL
//! enforcement (spec §8 scenario S2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::{GatewayError, Handler, Request, Response, Result};
use serde_json::{Map, Value};

/// Sleeps for `payload.delay_ms` milliseconds, then echoes its payload.
/// Polls a cooperative stop flag every 10ms so a supervisor-issued `stop()`
/// (raced by a TTL timeout) interrupts the sleep promptly rather than
/// running it to completion.
#[derive(Debug, Default)]
pub struct DelayedHandler {
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Handler for DelayedHandler {
    async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, request: &Request) -> Result<Response> {
        let delay_ms = request.payload.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        let mut remaining = delay_ms;
        const POLL_MS: u64 = 10;

        while remaining > 0 {
            if self.stopped.load(Ordering::Acquire) {
                return Err(GatewayError::HandlerFailed("stopped before delay elapsed".to_string()));
            }
            let step = remaining.min(POLL_MS);
            tokio::time::sleep(Duration::from_millis(step)).await;
            remaining -= step;
        }

        Ok(Response::success(request.request_id, "DELAYED", Value::Object(request.payload.clone()), delay_ms))
    }

    async fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }

    async fn cleanup(&mut self) {}
}
