//! Merge strategy application: how a step's output folds into the chain's
//! running `previous_output` (spec §3, §4.9).

use gateway_core::{JsonValue as Value, MergeStrategy};

/// Merge `incoming` into `previous_output` per `strategy`.
#[must_use]
pub fn merge(strategy: MergeStrategy, previous_output: &Value, incoming: &Value) -> Value {
    match strategy {
        MergeStrategy::Replace => incoming.clone(),
        MergeStrategy::Passthrough => previous_output.clone(),
        MergeStrategy::MergePrev => deep_merge(previous_output, incoming),
        MergeStrategy::Append => append(previous_output, incoming),
    }
}

fn deep_merge(base: &Value, overlay: &Value) -> Value {
    let (Value::Object(base_map), Value::Object(overlay_map)) = (base, overlay) else {
        return overlay.clone();
    };
    let mut merged = base_map.clone();
    for (key, value) in overlay_map {
        let merged_value = match merged.get(key) {
            Some(existing) => deep_merge(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), merged_value);
    }
    Value::Object(merged)
}

fn append(previous_output: &Value, incoming: &Value) -> Value {
    let mut items = match previous_output {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    match incoming {
        Value::Array(more) => items.extend(more.clone()),
        other => items.push(other.clone()),
    }
    Value::Array(items)
}
