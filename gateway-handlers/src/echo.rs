//! `ECHO`: returns its payload unchanged (spec §8 scenario S1).

use async_trait::async_trait;
use gateway_core::{Handler, Request, Response, Result};
use serde_json::{Map, Value};

/// Reflects its input payload back as `data`. Used as the canonical
/// golden-path handler for exercising ingestion end to end.
#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, request: &Request) -> Result<Response> {
        Ok(Response::success(request.request_id, "ECHO", Value::Object(request.payload.clone()), 0))
    }

    async fn stop(&mut self) {}
    async fn cleanup(&mut self) {}
}
