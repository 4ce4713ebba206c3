//! Handler registry (C4, spec §4.4): maps `request_type → HandlerConfig`
//! plus the factory used to build a fresh handler instance for each worker.
//!
//! Grounded on the tool-registry pattern of keeping the whole mapping behind
//! one lock and replacing it wholesale on reload, so a lookup racing a
//! reload always sees either the old or the new snapshot, never a partial
//! rebuild.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{Handler, HandlerConfig};
use tokio::sync::RwLock;

/// Builds a fresh [`Handler`] instance; called once per spawned worker so
/// concurrent requests for the same `request_type` never share state.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

#[derive(Clone)]
struct Binding {
    config: HandlerConfig,
    factory: HandlerFactory,
}

/// Maps `request_type → (HandlerConfig, HandlerFactory)` across config files
/// and per-user overrides (spec §4.4).
///
/// Cloning shares the same underlying map; cheap, intended to be handed to
/// every crate that needs to resolve a handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    bindings: Arc<RwLock<HashMap<String, Binding>>>,
}

impl HandlerRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a single binding.
    pub async fn register(&self, config: HandlerConfig, factory: HandlerFactory) {
        let mut bindings = self.bindings.write().await;
        bindings.insert(config.request_type.clone(), Binding { config, factory });
    }

    /// Atomically replace the entire mapping (spec §4.4: "`reload()`
    /// rescans and atomically publishes a new mapping").
    pub async fn reload(&self, entries: Vec<(HandlerConfig, HandlerFactory)>) {
        let fresh = entries
            .into_iter()
            .map(|(config, factory)| (config.request_type.clone(), Binding { config, factory }))
            .collect::<HashMap<_, _>>();
        let mut bindings = self.bindings.write().await;
        *bindings = fresh;
    }

    /// Resolve `request_type` to its config and a freshly constructed
    /// handler instance. `None` is the sentinel "not found" (spec §4.4).
    pub async fn resolve(&self, request_type: &str) -> Option<(HandlerConfig, Box<dyn Handler>)> {
        let bindings = self.bindings.read().await;
        bindings.get(request_type).map(|binding| (binding.config.clone(), (binding.factory)()))
    }

    /// `true` if `request_type` has a registered binding, without
    /// constructing a handler instance.
    pub async fn is_registered(&self, request_type: &str) -> bool {
        self.bindings.read().await.contains_key(request_type)
    }

    /// All currently registered request types, for `GET /api/v1/handlers`.
    pub async fn list_request_types(&self) -> Vec<String> {
        self.bindings.read().await.keys().cloned().collect()
    }

    /// Count of registered bindings.
    pub async fn count(&self) -> usize {
        self.bindings.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{Request, Response, Result};
    use serde_json::{Map, Value};

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, request: &Request) -> Result<Response> {
            Ok(Response::success(request.request_id, "noop", Value::Null, 0))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    fn config(request_type: &str) -> HandlerConfig {
        HandlerConfig {
            request_type: request_type.to_string(),
            handler_identifier: "noop".to_string(),
            ttl_minutes: 1.0,
            enabled: true,
            config: Map::new(),
        }
    }

    #[tokio::test]
    async fn unregistered_request_type_resolves_to_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("ECHO").await.is_none());
    }

    #[tokio::test]
    async fn registered_request_type_resolves_to_a_fresh_handler_each_time() {
        let registry = HandlerRegistry::new();
        registry.register(config("ECHO"), Arc::new(|| Box::new(NoopHandler))).await;

        assert!(registry.resolve("ECHO").await.is_some());
        assert!(registry.is_registered("ECHO").await);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn reload_atomically_replaces_the_whole_mapping() {
        let registry = HandlerRegistry::new();
        registry.register(config("ECHO"), Arc::new(|| Box::new(NoopHandler))).await;

        registry.reload(vec![(config("ARITHMETIC"), Arc::new(|| Box::new(NoopHandler)))]).await;

        assert!(!registry.is_registered("ECHO").await);
        assert!(registry.is_registered("ARITHMETIC").await);
        assert_eq!(registry.list_request_types().await, vec!["ARITHMETIC".to_string()]);
    }
}
