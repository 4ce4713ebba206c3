//! Declarative chain / step types (spec §3, §4.9).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a step's output merges into the running chain state (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStrategy {
    /// The step's output replaces `previous_output` wholesale.
    Replace,
    /// Deep-merge the step's output into `previous_output`.
    MergePrev,
    /// Append the step's output to a list accumulator.
    Append,
    /// Leave `previous_output` untouched; only record under the alias.
    Passthrough,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Replace
    }
}

/// How a parallel group's branch outputs are joined (spec §4.9.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinStrategy {
    /// `{branch_alias: branch_output, ...}`.
    Keyed,
    /// Deep-merge all successful branch outputs into one map.
    MergeAll,
    /// The first successful branch's output; others are discarded.
    FirstSuccess,
}

impl Default for JoinStrategy {
    fn default() -> Self {
        Self::Keyed
    }
}

/// What happens when a step fails (spec §3, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStrategy {
    /// Short-circuit the chain with an error response.
    Abort,
    /// Leave state untouched and continue to the next step.
    Skip,
    /// Merge the step's `fallback_value` as if it were the output.
    Fallback,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        Self::Abort
    }
}

/// One element of a chain: a single handler invocation, or a parallel
/// fan-out group (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepKind {
    /// A sequential handler invocation.
    Sequential(SequentialStep),
    /// A group of branches executed concurrently.
    Parallel(ParallelGroup),
}

/// A sequential chain step (spec §3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialStep {
    /// 1-based position in the chain, for trace/diagnostics.
    pub step: u32,
    /// Name of the handler to invoke.
    pub handler: String,
    /// Key under which this step's output is recorded in `step_outputs`.
    /// Defaults to the lowercased handler name, or `step_<n>`.
    #[serde(default)]
    pub alias: Option<String>,
    /// Declarative mapping from chain state to the sub-request payload.
    /// When absent, `previous_output` is passed through unchanged.
    #[serde(default)]
    pub payload_mapping: Option<Map<String, Value>>,
    /// How this step's output merges into chain state.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Guard expression; when it evaluates false, the step is skipped.
    #[serde(default)]
    pub when: Option<String>,
    /// Overrides the chain's error strategy for this step only.
    #[serde(default)]
    pub error_strategy: Option<ErrorStrategy>,
    /// Used in place of the step's output when `error_strategy` is `Fallback`.
    #[serde(default)]
    pub fallback_value: Option<Value>,
}

impl SequentialStep {
    /// Resolve this step's alias, defaulting per spec §4.9.
    #[must_use]
    pub fn resolved_alias(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.handler.to_lowercase())
    }
}

/// A parallel fan-out group (spec §3, §4.9.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelGroup {
    /// Branches to execute concurrently.
    pub parallel: Vec<SequentialStep>,
    /// How branch outputs are combined into one value.
    #[serde(default)]
    pub join_strategy: JoinStrategy,
    /// Per-chain override of the 60s default branch timeout (spec §9 Open
    /// Question 3: this is a configurable policy default, not hard-coded).
    #[serde(default)]
    pub branch_timeout_ms: Option<u64>,
}

/// A chain handler's full configuration (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Identifies this chain definition.
    pub chain_id: String,
    /// TTL for the chain handler's own supervised worker.
    pub ttl_minutes: f64,
    /// Default error strategy for steps that don't declare their own.
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    /// Ordered chain steps.
    pub steps: Vec<StepKind>,
    /// Default parallel branch timeout, in milliseconds (spec §9 Open
    /// Question 3). Individual parallel groups may override this.
    #[serde(default = "default_branch_timeout_ms")]
    pub default_branch_timeout_ms: u64,
}

const fn default_branch_timeout_ms() -> u64 {
    60_000
}

/// One row of the chain's execution trace (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// The step's alias, or index if unaliased.
    pub step: String,
    /// Outcome recorded for this step.
    pub outcome: TraceOutcome,
    /// Duration for this step, recorded on every terminal outcome (spec §9
    /// Open Question 1).
    pub duration_ms: u64,
    /// Present when `outcome` is `Failed`.
    pub error_message: Option<String>,
}

/// Outcome of one chain step, for the trace (spec §4.9, §8 scenario S3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceOutcome {
    /// The step ran and produced output.
    Succeeded,
    /// The step's `when` guard evaluated false.
    Skipped,
    /// The step failed (regardless of how the error strategy handled it).
    Failed,
}

/// The alias a `ChainStep` is recorded under in `step_outputs` (spec §4.9).
/// Kept as a thin type alias for readability at call sites.
pub type ChainStep = StepKind;
