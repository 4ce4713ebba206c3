//! Environment-sourced process configuration (spec §4.12 config file layout,
//! §6 config directory conventions).

/// Where on disk every `*.json` config source lives, plus the knobs that
/// aren't config files themselves (bind address, node identity, cluster
/// seeds).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket edge binds to.
    pub bind_addr: String,
    /// Directory containing `handlers/*.json`.
    pub handlers_dir: String,
    /// Directory containing `chains/*.json`.
    pub chains_dir: String,
    /// Directory containing `brokers/*.json`.
    pub brokers_dir: String,
    /// Path to the flat `apikeys.json` mapping.
    pub apikeys_path: String,
    /// Directory containing `input-channels/*.json`.
    pub input_channels_dir: String,
    /// Directory containing `ingesters/*.json`.
    pub ingesters_dir: String,
    /// This node's cluster identity.
    pub node_id: String,
    /// Seed peer addresses this node heartbeats against (spec §4.10).
    pub cluster_seeds: Vec<String>,
    /// Heartbeat exchange interval.
    pub heartbeat_interval_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// conventional defaults for everything a caller doesn't override.
    #[must_use]
    pub fn from_env() -> Self {
        let config_root = env_or("DGF_CONFIG_DIR", "config");
        let cluster_seeds = std::env::var("DGF_CLUSTER_SEEDS")
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            bind_addr: env_or("DGF_BIND_ADDR", "0.0.0.0:8080"),
            handlers_dir: format!("{config_root}/handlers"),
            chains_dir: format!("{config_root}/chains"),
            brokers_dir: format!("{config_root}/brokers"),
            apikeys_path: format!("{config_root}/apikeys.json"),
            input_channels_dir: format!("{config_root}/input-channels"),
            ingesters_dir: format!("{config_root}/ingesters"),
            node_id: env_or("DGF_NODE_ID", "node-1"),
            cluster_seeds,
            heartbeat_interval_secs: env_or("DGF_HEARTBEAT_INTERVAL_SECS", "5").parse().unwrap_or(5),
        }
    }
}
