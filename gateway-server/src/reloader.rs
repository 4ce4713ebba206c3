//! [`HandlerReloader`] implementation backing `POST /api/v1/reload` (spec
//! §4.4).

use async_trait::async_trait;
use gateway_config::{load_chains_dir, load_handlers_dir};
use gateway_core::{GatewayError, Result};
use gateway_dispatch::Dispatcher;
use gateway_web::HandlerReloader;

use crate::handlers::{register_builtin_handlers, register_chain_handlers};

/// Rescans `handlers/*.json` and `chains/*.json` and republishes both sets
/// of bindings into the dispatcher's registry.
pub struct ConfigReloader {
    handlers_dir: String,
    chains_dir: String,
    dispatcher: Dispatcher,
}

impl ConfigReloader {
    /// Build a reloader bound to the directories it rescans and the
    /// dispatcher whose registry it republishes into.
    #[must_use]
    pub fn new(handlers_dir: String, chains_dir: String, dispatcher: Dispatcher) -> Self {
        Self { handlers_dir, chains_dir, dispatcher }
    }
}

#[async_trait]
impl HandlerReloader for ConfigReloader {
    async fn reload(&self) -> Result<usize> {
        let handler_configs = load_handlers_dir(&self.handlers_dir)
            .await
            .map_err(|error| GatewayError::Other(error.to_string()))?;
        let chain_configs = load_chains_dir(&self.chains_dir)
            .await
            .map_err(|error| GatewayError::Other(error.to_string()))?;

        let registry = self.dispatcher.registry();
        register_builtin_handlers(registry, handler_configs).await;
        register_chain_handlers(registry, &self.dispatcher, chain_configs).await;

        Ok(registry.count().await)
    }
}
