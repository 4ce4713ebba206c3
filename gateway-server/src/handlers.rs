//! Wires config-declared handler and chain definitions into a
//! [`HandlerRegistry`] (spec §4.4, §4.9).

use std::sync::Arc;

use gateway_chain::ChainHandler;
use gateway_core::{ChainConfig, Handler, HandlerConfig};
use gateway_dispatch::{Dispatcher, HandlerFactory, HandlerRegistry};
use gateway_handlers::{ArithmeticHandler, DelayedHandler, EchoHandler};

/// Maps a `handler_identifier` (spec §4.4) to the concrete [`Handler`] it
/// builds. Operators adding their own handlers extend this match arm at
/// compile time — there's no dynamic-loading mechanism in scope here.
fn builtin_factory(handler_identifier: &str) -> Option<HandlerFactory> {
    match handler_identifier {
        "ECHO" => Some(Arc::new(|| Box::new(EchoHandler) as Box<dyn Handler>)),
        "ARITHMETIC" => Some(Arc::new(|| Box::new(ArithmeticHandler) as Box<dyn Handler>)),
        "DELAYED" => Some(Arc::new(|| Box::new(DelayedHandler::default()) as Box<dyn Handler>)),
        _ => None,
    }
}

/// Register every config-declared built-in handler binding, skipping (and
/// logging) entries whose `handler_identifier` isn't one of the built-ins.
pub async fn register_builtin_handlers(registry: &HandlerRegistry, configs: Vec<HandlerConfig>) {
    for config in configs {
        if !config.enabled {
            continue;
        }
        match builtin_factory(&config.handler_identifier) {
            Some(factory) => registry.register(config, factory).await,
            None => tracing::warn!(handler_identifier = %config.handler_identifier, request_type = %config.request_type, "no built-in factory for this handler_identifier"),
        }
    }
}

/// Register one [`ChainHandler`] binding per loaded [`ChainConfig`], under
/// `request_type = chain_id` (spec §4.9: a chain is itself a handler that
/// re-enters the dispatcher for its steps).
pub async fn register_chain_handlers(registry: &HandlerRegistry, dispatcher: &Dispatcher, chains: Vec<ChainConfig>) {
    for chain in chains {
        let handler_config = HandlerConfig {
            request_type: chain.chain_id.clone(),
            handler_identifier: "CHAIN".to_string(),
            ttl_minutes: chain.ttl_minutes,
            enabled: true,
            config: serde_json::Map::new(),
        };
        let dispatcher = dispatcher.clone();
        let factory: HandlerFactory = Arc::new(move || {
            Box::new(ChainHandler::new(chain.clone(), dispatcher.clone())) as Box<dyn Handler>
        });
        registry.register(handler_config, factory).await;
    }
}
