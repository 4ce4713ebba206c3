//! Parallel-group join strategies (spec §4.9.2): how a fan-out group's
//! branch outputs combine into the single value the next step sees.

use gateway_core::{JsonValue as Value, JoinStrategy};
use serde_json::Map;

use crate::merge::merge;

/// One branch's outcome within a parallel group.
pub struct BranchOutcome {
    /// The branch's resolved alias.
    pub alias: String,
    /// `false` if the branch's error strategy didn't recover it.
    pub success: bool,
    /// The branch's output (or its fallback/error placeholder).
    pub output: Value,
}

/// Combine `branches` per `strategy`.
#[must_use]
pub fn join(strategy: JoinStrategy, branches: &[BranchOutcome]) -> Value {
    match strategy {
        JoinStrategy::Keyed => {
            let map: Map<String, Value> = branches.iter().map(|b| (b.alias.clone(), b.output.clone())).collect();
            Value::Object(map)
        }
        JoinStrategy::MergeAll => branches
            .iter()
            .filter(|b| b.success)
            .fold(Value::Object(Map::new()), |acc, b| merge(gateway_core::MergeStrategy::MergePrev, &acc, &b.output)),
        JoinStrategy::FirstSuccess => branches.iter().find(|b| b.success).map(|b| b.output.clone()).unwrap_or(Value::Null),
    }
}
