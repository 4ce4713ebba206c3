//! HTTP/WebSocket edge for the data-gateway facade (spec §6).
//!
//! # Request Flow
//!
//! 1. A request arrives as `POST /api/v1/request`, is parsed into a
//!    [`gateway_core::Request`], and handed to
//!    [`gateway_dispatch::Dispatcher::submit`].
//! 2. The dispatcher resolves, routes, and awaits a terminal
//!    [`gateway_core::Response`], which is returned directly as the HTTP
//!    body — REST delivery never goes through the WebSocket registry.
//! 3. A session that also asked for `WEBSOCKET` delivery is pushed to any
//!    connection subscribed to its `request_id` via [`ws::WsRegistry`].
//!
//! Cluster coordination (`/api/v1/cluster/*`) and registry introspection
//! (`/api/v1/handlers`, `/api/v1/status`, `/api/v1/reload`) are served
//! alongside the request path on the same router.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod reload;
pub mod router;
pub mod state;
pub mod ws;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::RequestIdHeader;
pub use middleware::{request_id_layer, RequestIdExt, REQUEST_ID_HEADER};
pub use reload::HandlerReloader;
pub use router::router;
pub use state::AppState;
pub use ws::WsRegistry;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
