//! `GET /api/v1/status` (spec §6): live worker count plus the bounded
//! terminal-state history (spec §4.6).

use axum::extract::State;
use axum::Json;
use gateway_core::HandlerState;
use serde::Serialize;

use crate::state::AppState;

/// Snapshot of worker activity returned by the status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Workers currently in a non-terminal phase.
    active_count: usize,
    /// Bounded ring of terminal states (spec §4.6: capped by size and age).
    history: Vec<HandlerState>,
}

/// Report live worker activity and recent terminal history.
pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let supervisor = state.dispatcher.supervisor();
    let active_count = supervisor.active_count().await;
    let history = supervisor.history().await;
    Json(StatusReport { active_count, history })
}
