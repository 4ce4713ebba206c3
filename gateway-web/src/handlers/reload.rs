//! `POST /api/v1/reload` (spec §4.4, §6): rescan handler config and
//! atomically republish the registry.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;
use crate::WebResult;

/// Count of bindings published by a reload.
#[derive(Debug, Serialize)]
pub struct ReloadReport {
    /// Number of `request_type` bindings now in the registry.
    reloaded: usize,
}

/// Trigger a handler registry reload.
///
/// # Errors
///
/// Returns an error if handler config can't be read or parsed; the registry
/// in use is left untouched (spec §4.4: a reload either fully replaces the
/// mapping or fully fails).
pub async fn reload(State(state): State<AppState>) -> WebResult<Json<ReloadReport>> {
    let reloaded = state.reloader.reload().await?;
    Ok(Json(ReloadReport { reloaded }))
}
