//! File-level shapes for the configs whose semantics are entirely
//! `gateway-config`'s own concern: input channels and ingester definitions
//! feed [`gateway_ingest`](../../gateway-ingest)'s resolution chain (spec
//! §4.3), rather than being consumed directly by `gateway-core` types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dir::json_files;
use crate::loader::{load_json, ConfigError};

/// One entry from `channels/input/*.json`: the destinations and policies an
/// ingester layers on top of its broker's connection properties (spec
/// §4.3's "input-channel" resolution source).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputChannelConfig {
    /// Identifies this channel, referenced by ingester definitions.
    pub channel_id: String,
    /// The broker this channel's topic lives on.
    pub broker_id: String,
    /// Topic/queue/directory name to subscribe to.
    pub topic: String,
    /// Channel-level properties, deep-merged under the broker's own.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// One entry from `ingesters/*.json`: binds an input channel to a running
/// [`gateway_ingest::Ingester`](../../gateway-ingest), with its own
/// overrides on top of the channel and broker (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngesterDefinition {
    /// Identifies this ingester instance.
    pub ingester_id: String,
    /// The input channel this ingester consumes.
    pub channel_id: String,
    /// Default TTL assigned to requests that don't carry their own.
    pub ttl_minutes: f64,
    /// Highest-precedence source in the resolution chain.
    #[serde(default)]
    pub overrides: Map<String, Value>,
}

/// Load every `input-channels/*.json` file under `dir`, one
/// [`InputChannelConfig`] per file, in sorted file order.
///
/// # Errors
///
/// Returns [`ConfigError`] if any file can't be read or parsed.
pub async fn load_input_channels_dir(dir: &str) -> Result<Vec<InputChannelConfig>, ConfigError> {
    let mut all = Vec::new();
    for path in json_files(dir) {
        all.push(load_json(&path).await?);
    }
    Ok(all)
}

/// Load every `ingesters/*.json` file under `dir`, one [`IngesterDefinition`]
/// per file, in sorted file order.
///
/// # Errors
///
/// Returns [`ConfigError`] if any file can't be read or parsed.
pub async fn load_ingesters_dir(dir: &str) -> Result<Vec<IngesterDefinition>, ConfigError> {
    let mut all = Vec::new();
    for path in json_files(dir) {
        all.push(load_json(&path).await?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_channel_config_round_trips_through_json() {
        let json = serde_json::json!({
            "channel_id": "orders-in",
            "broker_id": "kafka-main",
            "topic": "orders",
            "properties": {"group_id": "gateway"}
        });
        let config: InputChannelConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.channel_id, "orders-in");
        assert_eq!(config.properties["group_id"], "gateway");
    }

    #[test]
    fn ingester_definition_defaults_overrides_to_empty() {
        let json = serde_json::json!({"ingester_id": "orders-ingest", "channel_id": "orders-in", "ttl_minutes": 5.0});
        let definition: IngesterDefinition = serde_json::from_value(json).unwrap();
        assert!(definition.overrides.is_empty());
    }
}
