//! `GET /api/v1/handlers` (spec §6): list every registered request type.

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// List the request types currently resolvable by the dispatcher's handler
/// registry (spec §4.4).
pub async fn list_handlers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dispatcher.registry().list_request_types().await)
}
