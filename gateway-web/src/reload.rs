//! Handler registry reload (spec §4.4 `reload()`, §6 `POST /api/v1/reload`).
//!
//! Rebuilding the registry needs a `request_type -> HandlerFactory` mapping
//! that only the binary assembling concrete handler types knows; this crate
//! only needs to trigger it and report how many bindings came back.

use async_trait::async_trait;
use gateway_core::Result;

/// Rescans handler config and atomically republishes the registry.
///
/// Implemented by the binary that owns the concrete `HandlerFactory`
/// mapping; the web layer only calls through it.
#[async_trait]
pub trait HandlerReloader: Send + Sync {
    /// Reload handler bindings, returning how many were published.
    ///
    /// # Errors
    ///
    /// Returns an error if the handler config can't be read or parsed.
    async fn reload(&self) -> Result<usize>;
}
