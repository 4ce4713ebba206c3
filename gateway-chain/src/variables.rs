//! `${path}` variable resolution against a chain's accumulated state (spec
//! §4.9.1).
//!
//! A path's root selects which part of the state it reads from:
//! `payload` (the chain's original input), `prev` (the previous step's
//! merged output), `steps.<alias>` (a specific earlier step's output), or
//! `chain.request_id` / `chain.step`. Everything after the root is a
//! dotted/indexed descent into that value. A path that doesn't resolve
//! yields `null` rather than failing the step.

use gateway_core::{JsonValue as Value, Uuid};
use serde_json::Map;

/// The state one chain step's variable expressions are resolved against.
pub struct ChainState<'a> {
    /// The chain's original input payload.
    pub payload: &'a Value,
    /// The previous step's merged output (the chain's input on step 1).
    pub previous_output: &'a Value,
    /// Every earlier step's output, keyed by resolved alias.
    pub step_outputs: &'a Map<String, Value>,
    /// The chain's own request id.
    pub request_id: Uuid,
    /// 1-based index of the step currently executing.
    pub step: u32,
}

/// Resolve every `${...}` expression in `input`, recursing through objects
/// and arrays.
///
/// A string that is *exactly* one `${expr}` substitutes the resolved value
/// verbatim, preserving its type. A `${expr}` embedded in a larger string is
/// stringified in place.
#[must_use]
pub fn resolve(input: &Value, state: &ChainState<'_>) -> Value {
    match input {
        Value::String(s) => resolve_string(s, state),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), resolve(v, state))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, state)).collect()),
        other => other.clone(),
    }
}

fn resolve_string(raw: &str, state: &ChainState<'_>) -> Value {
    if let Some(expr) = whole_expression(raw) {
        return lookup(expr, state);
    }
    if !raw.contains("${") {
        return Value::String(raw.to_string());
    }

    let mut result = String::new();
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(end) => {
                let expr = &rest[start + 2..start + end];
                result.push_str(&stringify(&lookup(expr, state)));
                rest = &rest[start + end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    result.push_str(rest);
    Value::String(result)
}

/// `Some(expr)` iff `raw` is exactly one `${expr}` with nothing around it.
fn whole_expression(raw: &str) -> Option<&str> {
    let expr = raw.strip_prefix("${")?.strip_suffix('}')?;
    if expr.contains("${") {
        return None;
    }
    Some(expr)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve one dotted path against `payload`/`prev`/`steps.<alias>`/`chain.*`.
/// Unresolved at any point along the descent yields `null` (spec §4.9.1).
pub(crate) fn lookup(path: &str, state: &ChainState<'_>) -> Value {
    let mut segments = path.split('.');
    let Some(root) = segments.next() else {
        return Value::Null;
    };

    match root {
        "payload" => segments.fold(state.payload.clone(), |acc, seg| descend(&acc, seg)),
        "prev" => segments.fold(state.previous_output.clone(), |acc, seg| descend(&acc, seg)),
        "steps" => match segments.next() {
            Some(alias) => match state.step_outputs.get(alias) {
                Some(value) => segments.fold(value.clone(), |acc, seg| descend(&acc, seg)),
                None => Value::Null,
            },
            None => Value::Null,
        },
        "chain" => match segments.next() {
            Some("request_id") => Value::String(state.request_id.to_string()),
            Some("step") => Value::from(state.step),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn descend(value: &Value, segment: &str) -> Value {
    match value {
        Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Null),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state<'a>(payload: &'a Value, prev: &'a Value, steps: &'a Map<String, Value>) -> ChainState<'a> {
        ChainState { payload, previous_output: prev, step_outputs: steps, request_id: Uuid::nil(), step: 2 }
    }

    #[test]
    fn whole_expression_preserves_type() {
        let payload = json!({"count": 3});
        let prev = Value::Null;
        let steps = Map::new();
        let resolved = resolve(&json!("${payload.count}"), &state(&payload, &prev, &steps));
        assert_eq!(resolved, json!(3));
    }

    #[test]
    fn embedded_expression_is_stringified() {
        let payload = json!({"name": "ada"});
        let prev = Value::Null;
        let steps = Map::new();
        let resolved = resolve(&json!("hello ${payload.name}!"), &state(&payload, &prev, &steps));
        assert_eq!(resolved, json!("hello ada!"));
    }

    #[test]
    fn unresolved_path_is_null() {
        let payload = json!({});
        let prev = Value::Null;
        let steps = Map::new();
        let resolved = resolve(&json!("${payload.missing.deeper}"), &state(&payload, &prev, &steps));
        assert_eq!(resolved, Value::Null);
    }

    #[test]
    fn steps_alias_reaches_into_an_earlier_output() {
        let payload = Value::Null;
        let prev = Value::Null;
        let mut steps = Map::new();
        steps.insert("arithmetic".to_string(), json!({"result": 42}));
        let resolved = resolve(&json!("${steps.arithmetic.result}"), &state(&payload, &prev, &steps));
        assert_eq!(resolved, json!(42));
    }

    #[test]
    fn chain_step_resolves_to_the_current_step_index() {
        let payload = Value::Null;
        let prev = Value::Null;
        let steps = Map::new();
        let resolved = resolve(&json!("${chain.step}"), &state(&payload, &prev, &steps));
        assert_eq!(resolved, json!(2));
    }

    #[test]
    fn array_index_descent_works() {
        let payload = json!({"items": ["a", "b", "c"]});
        let prev = Value::Null;
        let steps = Map::new();
        let resolved = resolve(&json!("${payload.items.1}"), &state(&payload, &prev, &steps));
        assert_eq!(resolved, json!("b"));
    }

    #[test]
    fn nested_object_recurses_through_payload_mapping() {
        let payload = json!({"a": 1, "b": 2});
        let prev = Value::Null;
        let steps = Map::new();
        let mapping = json!({"x": "${payload.a}", "y": {"nested": "${payload.b}"}});
        let resolved = resolve(&mapping, &state(&payload, &prev, &steps));
        assert_eq!(resolved, json!({"x": 1, "y": {"nested": 2}}));
    }
}
