//! Binary entrypoint: loads every config directory, assembles the
//! dispatch pipeline, starts ingestion and cluster heartbeat, and serves
//! the HTTP/WebSocket edge (spec §3, §6).

mod brokers;
mod config;
mod handlers;
mod ingest;
mod reloader;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gateway_cluster::{ClusterRegistry, HeartbeatService};
use gateway_core::{ClusterNode, NodeRole, NodeStatus, Utc};
use gateway_dispatch::{Dispatcher, DispatcherConfig, HandlerRegistry, MultiChannelPublisher, RestBuffer, StreamingSessionManager};
use gateway_runtime::Supervisor;
use gateway_web::{AppState, WsRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(node_id = %config.node_id, bind_addr = %config.bind_addr, "starting data-gateway facade");

    let acl = gateway_config::load_acl_table(&config.apikeys_path).await?;
    let handler_configs = gateway_config::load_handlers_dir(&config.handlers_dir).await?;
    let chain_configs = gateway_config::load_chains_dir(&config.chains_dir).await?;
    let resolver = gateway_core::config::PlaceholderResolver::new();
    let broker_configs = gateway_config::load_brokers_dir(&config.brokers_dir, &resolver).await?;
    let input_channels = gateway_config::load_input_channels_dir(&config.input_channels_dir).await?;
    let ingester_definitions = gateway_config::load_ingesters_dir(&config.ingesters_dir).await?;

    let registry = HandlerRegistry::new();

    let mut broker_publishers = HashMap::new();
    for broker in &broker_configs {
        match brokers::build_publisher(broker).await {
            Ok(publisher) => {
                broker_publishers.insert(broker.broker_id.clone(), publisher);
            }
            Err(error) => tracing::warn!(broker_id = %broker.broker_id, %error, "broker publisher unavailable"),
        }
    }

    let ws_registry = WsRegistry::new();
    let publisher = MultiChannelPublisher::new(RestBuffer::new(), Some(ws_registry.sink()), broker_publishers);

    let dispatcher_config = DispatcherConfig { clustering_enabled: !config.cluster_seeds.is_empty(), local_node_id: config.node_id.clone(), forward_timeout: Duration::from_secs(10) };

    let dispatcher = Dispatcher::new(registry, acl, Supervisor::new(), StreamingSessionManager::default(), publisher, dispatcher_config);

    handlers::register_builtin_handlers(dispatcher.registry(), handler_configs).await;
    handlers::register_chain_handlers(dispatcher.registry(), &dispatcher, chain_configs).await;

    let ingesters = ingest::start_ingesters(ingester_definitions, &input_channels, &broker_configs, &dispatcher).await?;
    tracing::info!(count = ingesters.len(), "ingesters started");

    let local_node = ClusterNode {
        node_id: config.node_id.clone(),
        address: format!("http://{}", config.bind_addr),
        role: NodeRole::Both,
        status: NodeStatus::Up,
        active_handlers: 0,
        cpu_load: 0.0,
        last_heartbeat: Utc::now(),
    };
    let cluster = ClusterRegistry::new(local_node);
    let heartbeat_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let heartbeat = Arc::new(HeartbeatService::new(cluster.clone(), heartbeat_interval));
    HeartbeatService::new(cluster.clone(), heartbeat_interval).spawn(config.cluster_seeds.clone());

    let reloader = Arc::new(reloader::ConfigReloader::new(config.handlers_dir.clone(), config.chains_dir.clone(), dispatcher.clone()));

    let state = AppState::new(dispatcher, cluster, heartbeat, ws_registry, reloader);
    let router = gateway_web::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
