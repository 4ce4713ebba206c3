//! `POST /api/v1/request` (spec §6): submit a request over REST and await
//! its terminal response.

use std::collections::BTreeSet;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use gateway_core::{DeliveryDestination, Request, Response, ResponseChannel};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::RequestIdHeader;
use crate::state::AppState;
use crate::WebResult;

/// Default TTL when a caller doesn't name one (spec §4.2 default).
const DEFAULT_TTL_MINUTES: f64 = 5.0;

/// Wire shape of an inbound REST request envelope (spec §6).
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    request_id: Option<Uuid>,
    request_type: String,
    api_key: String,
    #[serde(default)]
    payload: Map<String, Value>,
    delivery_destination: Option<String>,
    ttl_minutes: Option<f64>,
    #[serde(default)]
    response_channels: BTreeSet<ResponseChannel>,
    response_topic: Option<String>,
}

/// Submit a request and return its terminal response (spec §4.7, §6).
///
/// A caller that wants to open its WebSocket subscription before this call
/// returns can set the `X-Request-Id` header instead of (or in addition to)
/// `request_id` in the body; the header only takes effect when the body
/// omits the field.
///
/// # Errors
///
/// Returns [`AppError::bad_request`] if `request_type` or `api_key` are
/// blank; the dispatcher's own rejection/auth/timeout outcomes are carried
/// in the returned [`Response`] body, not as an HTTP error status (spec §6:
/// "200 on success envelope; the envelope carries its own status even on
/// handler errors").
pub async fn submit(
    State(state): State<AppState>,
    RequestIdHeader(request_id_header): RequestIdHeader,
    Json(raw): Json<SubmitRequest>,
) -> WebResult<Json<Response>> {
    if raw.request_type.trim().is_empty() {
        return Err(AppError::bad_request("request_type must not be blank"));
    }
    if raw.api_key.trim().is_empty() {
        return Err(AppError::bad_request("api_key must not be blank"));
    }

    let request = Request {
        request_id: raw.request_id.unwrap_or(request_id_header),
        request_type: raw.request_type,
        api_key: raw.api_key,
        payload: raw.payload,
        delivery_destination: raw.delivery_destination.as_deref().map(DeliveryDestination::parse),
        ttl_minutes: raw.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES),
        source_channel: "rest".to_string(),
        received_at: Some(Utc::now()),
        resolved_user_id: None,
        response_channels: raw.response_channels,
        response_topic: raw.response_topic,
    };

    let response = state.dispatcher.submit(request).await;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_rejects_a_blank_request_type_before_touching_the_dispatcher() {
        let raw: SubmitRequest = serde_json::from_value(serde_json::json!({
            "request_type": "   ",
            "api_key": "k",
        }))
        .unwrap();
        assert!(raw.request_type.trim().is_empty());
    }

    #[test]
    fn submit_request_defaults_response_channels_to_empty() {
        let raw: SubmitRequest = serde_json::from_value(serde_json::json!({
            "request_type": "ECHO",
            "api_key": "k",
        }))
        .unwrap();
        assert!(raw.response_channels.is_empty());
    }
}
