//! Resolution chain (spec §4.3): an ingester's effective config is the
//! deep-merge, in order, of its broker's connection properties, its
//! input-channel's destinations/policies, and its own overrides — conflicts
//! favour later sources.

use serde_json::{Map, Value};

/// Deep-merge `overlay` onto `base`, later keys winning. Nested objects
/// merge recursively; any other value (including arrays) is replaced
/// wholesale by the overlay's value.
#[must_use]
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Resolve an ingester's effective config from its three sources, in
/// ascending precedence order.
#[must_use]
pub fn resolve_chain(broker_config: &Map<String, Value>, channel_config: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let merged = deep_merge(&Value::Object(broker_config.clone()), &Value::Object(channel_config.clone()));
    let merged = deep_merge(&merged, &Value::Object(overrides.clone()));
    match merged {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_source_wins_on_scalar_conflict() {
        let broker = json!({"host": "broker-a", "port": 9092}).as_object().unwrap().clone();
        let channel = json!({"port": 9093}).as_object().unwrap().clone();
        let overrides = Map::new();
        let resolved = resolve_chain(&broker, &channel, &overrides);
        assert_eq!(resolved["host"], json!("broker-a"));
        assert_eq!(resolved["port"], json!(9093));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let broker = json!({"tls": {"enabled": true, "ca": "/etc/ca.pem"}}).as_object().unwrap().clone();
        let overrides = json!({"tls": {"enabled": false}}).as_object().unwrap().clone();
        let resolved = resolve_chain(&broker, &Map::new(), &overrides);
        assert_eq!(resolved["tls"], json!({"enabled": false, "ca": "/etc/ca.pem"}));
    }

    #[test]
    fn overrides_take_precedence_over_both_earlier_sources() {
        let broker = json!({"topic": "a"}).as_object().unwrap().clone();
        let channel = json!({"topic": "b"}).as_object().unwrap().clone();
        let overrides = json!({"topic": "c"}).as_object().unwrap().clone();
        let resolved = resolve_chain(&broker, &channel, &overrides);
        assert_eq!(resolved["topic"], json!("c"));
    }
}
