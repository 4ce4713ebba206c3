//! `when` guard evaluation (spec §4.9.3): `<ref> <op> <literal>` with
//! `op ∈ {==, !=, >, <, >=, <=, contains, exists}`, or a bare `${ref}` read
//! for truthiness. An expression that doesn't parse defaults to `false`.

use gateway_core::JsonValue as Value;

use crate::variables::{self, ChainState};

/// Evaluate `when` against `state`.
#[must_use]
pub fn evaluate(when: &str, state: &ChainState<'_>) -> bool {
    let when = when.trim();
    let tokens: Vec<&str> = when.split_whitespace().collect();

    match tokens.as_slice() {
        [bare] => truthy(&resolve_ref(bare, state)),
        [lhs, "exists"] => !matches!(resolve_ref(lhs, state), Value::Null),
        [lhs, op, rhs @ ..] if !rhs.is_empty() => apply(lhs, op, &rhs.join(" "), state),
        _ => {
            tracing::warn!(%when, "unparseable `when` expression, defaulting to false");
            false
        }
    }
}

fn resolve_ref(raw: &str, state: &ChainState<'_>) -> Value {
    variables::resolve(&Value::String(raw.to_string()), state)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn apply(lhs: &str, op: &str, rhs: &str, state: &ChainState<'_>) -> bool {
    let lhs_value = resolve_ref(lhs, state);
    let rhs_value = literal(rhs);

    match op {
        "==" => values_equal(&lhs_value, &rhs_value),
        "!=" => !values_equal(&lhs_value, &rhs_value),
        "contains" => contains(&lhs_value, &rhs_value),
        ">" | "<" | ">=" | "<=" => compare(&lhs_value, &rhs_value, op),
        _ => {
            tracing::warn!(op, "unknown `when` operator, defaulting to false");
            false
        }
    }
}

/// Parse a literal token: a quoted string, `true`/`false`, a number, or a
/// bare word treated as a string.
fn literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(unquoted) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Value::String(unquoted.to_string());
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

/// A value "parses as a number" for comparison purposes if it's already a
/// JSON number, or a string that parses as one (spec §4.9.3: "numeric
/// comparison is used iff both sides parse as numbers").
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return (a - b).abs() < f64::EPSILON;
    }
    stringify(lhs) == stringify(rhs)
}

fn compare(lhs: &Value, rhs: &Value, op: &str) -> bool {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return match op {
            ">" => a > b,
            "<" => a < b,
            ">=" => a >= b,
            "<=" => a <= b,
            _ => false,
        };
    }
    let a = stringify(lhs);
    let b = stringify(rhs);
    match op {
        ">" => a > b,
        "<" => a < b,
        ">=" => a >= b,
        "<=" => a <= b,
        _ => false,
    }
}

fn contains(lhs: &Value, rhs: &Value) -> bool {
    match lhs {
        Value::Array(items) => items.iter().any(|item| values_equal(item, rhs)),
        Value::String(s) => s.contains(&stringify(rhs)),
        _ => false,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn state<'a>(payload: &'a Value, steps: &'a Map<String, Value>) -> ChainState<'a> {
        ChainState { payload, previous_output: payload, step_outputs: steps, request_id: gateway_core::Uuid::nil(), step: 1 }
    }

    #[test]
    fn numeric_equality() {
        let payload = json!({"count": 3});
        let steps = Map::new();
        assert!(evaluate("${payload.count} == 3", &state(&payload, &steps)));
        assert!(!evaluate("${payload.count} == 4", &state(&payload, &steps)));
    }

    #[test]
    fn string_equality_with_quotes() {
        let payload = json!({"status": "ok"});
        let steps = Map::new();
        assert!(evaluate(r#"${payload.status} == "ok""#, &state(&payload, &steps)));
    }

    #[test]
    fn numeric_ordering() {
        let payload = json!({"count": 10});
        let steps = Map::new();
        assert!(evaluate("${payload.count} > 5", &state(&payload, &steps)));
        assert!(evaluate("${payload.count} <= 10", &state(&payload, &steps)));
    }

    #[test]
    fn exists_checks_non_null() {
        let payload = json!({"present": 1});
        let steps = Map::new();
        assert!(evaluate("${payload.present} exists", &state(&payload, &steps)));
        assert!(!evaluate("${payload.missing} exists", &state(&payload, &steps)));
    }

    #[test]
    fn contains_checks_array_membership() {
        let payload = json!({"tags": ["a", "b"]});
        let steps = Map::new();
        assert!(evaluate(r#"${payload.tags} contains "a""#, &state(&payload, &steps)));
        assert!(!evaluate(r#"${payload.tags} contains "z""#, &state(&payload, &steps)));
    }

    #[test]
    fn bare_reference_is_truthy_check() {
        let payload = json!({"enabled": true, "disabled": false});
        let steps = Map::new();
        assert!(evaluate("${payload.enabled}", &state(&payload, &steps)));
        assert!(!evaluate("${payload.disabled}", &state(&payload, &steps)));
    }

    #[test]
    fn unparseable_expression_defaults_to_false() {
        let payload = json!({});
        let steps = Map::new();
        assert!(!evaluate("", &state(&payload, &steps)));
    }
}
