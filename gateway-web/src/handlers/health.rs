//! `GET /api/v1/health` (spec §6): liveness check for load balancers and
//! cluster peers probing this node before forwarding to it.

use axum::http::StatusCode;

/// Always returns 200 once the process is serving traffic. Deliberately
/// cheap: readiness (handler registry populated, brokers connected) is a
/// separate concern from "is this process alive".
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
