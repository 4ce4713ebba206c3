//! Chain Engine (C10, spec §4.9): the handler that drives one declarative
//! [`ChainConfig`] by re-entering a [`Dispatcher`] for each step.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use gateway_core::chain::{ParallelGroup, SequentialStep, TraceEntry, TraceOutcome};
use gateway_core::{ChainConfig, ErrorStrategy, GatewayError, Handler, JsonValue as Value, Request, Response, ResponseStatus, Result, StepKind, Uuid};
use gateway_dispatch::Dispatcher;
use serde_json::Map;
use tokio::sync::Semaphore;

use crate::join::{join, BranchOutcome};
use crate::merge::merge;
use crate::variables::{self, ChainState as VarState};
use crate::when;

/// Concurrency ceiling for a parallel group's branches, applied on top of
/// the group's own branch count (spec §4.9.2: "concurrency ≤
/// min(branches, configured-cap)").
const DEFAULT_PARALLEL_CAP: usize = 8;

/// Drives one [`ChainConfig`] through a [`Dispatcher`], one step at a time.
pub struct ChainHandler {
    config: ChainConfig,
    dispatcher: Dispatcher,
    stopped: Arc<AtomicBool>,
}

impl ChainHandler {
    /// Build a chain handler bound to `config`, re-entering `dispatcher` for
    /// every step (spec §4.9: "via a fresh Dispatcher call").
    #[must_use]
    pub fn new(config: ChainConfig, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher, stopped: Arc::new(AtomicBool::new(false)) }
    }
}

enum StepCallResult {
    Skipped,
    Succeeded(Value),
    Failed(String),
}

struct StepRunOutcome {
    trace: TraceEntry,
    output: Option<Value>,
}

impl ChainHandler {
    async fn call_step(&self, step: &SequentialStep, request: &Request, original_payload: &Value, previous_output: &Value, step_outputs: &Map<String, Value>) -> StepCallResult {
        let var_state = VarState { payload: original_payload, previous_output, step_outputs, request_id: request.request_id, step: step.step };

        if let Some(when) = &step.when {
            if !when::evaluate(when, &var_state) {
                return StepCallResult::Skipped;
            }
        }

        let payload = match &step.payload_mapping {
            Some(mapping) => resolve_mapping(mapping, &var_state),
            None => as_payload_map(previous_output),
        };

        let sub_request = build_sub_request(request, &step.handler, payload);
        let response = self.dispatcher.submit(sub_request).await;

        if matches!(response.status, ResponseStatus::Success | ResponseStatus::Partial) {
            StepCallResult::Succeeded(response.data.unwrap_or(Value::Null))
        } else {
            StepCallResult::Failed(response.error_message.unwrap_or_else(|| "step failed".to_string()))
        }
    }

    async fn run_sequential_step(
        &self,
        step: &SequentialStep,
        request: &Request,
        original_payload: &Value,
        previous_output: &Value,
        step_outputs: &Map<String, Value>,
    ) -> StepRunOutcome {
        let alias = step.resolved_alias();
        let started = Instant::now();
        match self.call_step(step, request, original_payload, previous_output, step_outputs).await {
            StepCallResult::Skipped => StepRunOutcome {
                trace: TraceEntry { step: alias, outcome: TraceOutcome::Skipped, duration_ms: elapsed_ms(started), error_message: None },
                output: None,
            },
            StepCallResult::Succeeded(output) => StepRunOutcome {
                trace: TraceEntry { step: alias, outcome: TraceOutcome::Succeeded, duration_ms: elapsed_ms(started), error_message: None },
                output: Some(output),
            },
            StepCallResult::Failed(message) => StepRunOutcome {
                trace: TraceEntry { step: alias, outcome: TraceOutcome::Failed, duration_ms: elapsed_ms(started), error_message: Some(message) },
                output: None,
            },
        }
    }

    async fn run_branch(
        &self,
        step: &SequentialStep,
        request: &Request,
        original_payload: &Value,
        previous_output: &Value,
        step_outputs: &Map<String, Value>,
        timeout: Duration,
    ) -> (TraceEntry, BranchOutcome) {
        let alias = step.resolved_alias();
        let started = Instant::now();
        let error_strategy = step.error_strategy.unwrap_or(self.config.error_strategy);

        match tokio::time::timeout(timeout, self.call_step(step, request, original_payload, previous_output, step_outputs)).await {
            Ok(StepCallResult::Skipped) => (
                TraceEntry { step: alias.clone(), outcome: TraceOutcome::Skipped, duration_ms: elapsed_ms(started), error_message: None },
                BranchOutcome { alias, success: true, output: Value::Null },
            ),
            Ok(StepCallResult::Succeeded(output)) => (
                TraceEntry { step: alias.clone(), outcome: TraceOutcome::Succeeded, duration_ms: elapsed_ms(started), error_message: None },
                BranchOutcome { alias, success: true, output },
            ),
            Ok(StepCallResult::Failed(message)) => branch_failure(alias, error_strategy, &step.fallback_value, message, started),
            Err(_) => branch_failure(alias, error_strategy, &step.fallback_value, "branch timed out".to_string(), started),
        }
    }

    async fn run_parallel_group(
        &self,
        group: &ParallelGroup,
        request: &Request,
        original_payload: &Value,
        previous_output: &Value,
        step_outputs: &Map<String, Value>,
    ) -> (Vec<TraceEntry>, Vec<BranchOutcome>, bool) {
        let timeout = Duration::from_millis(group.branch_timeout_ms.unwrap_or(self.config.default_branch_timeout_ms));
        let permits = group.parallel.len().clamp(1, DEFAULT_PARALLEL_CAP);
        let semaphore = Semaphore::new(permits);

        let runs = group.parallel.iter().map(|step| async {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    let alias = step.resolved_alias();
                    return (
                        TraceEntry { step: alias.clone(), outcome: TraceOutcome::Failed, duration_ms: 0, error_message: Some("branch semaphore closed".to_string()) },
                        BranchOutcome { alias, success: false, output: Value::Null },
                    );
                }
            };
            self.run_branch(step, request, original_payload, previous_output, step_outputs, timeout).await
        });

        let results: Vec<(TraceEntry, BranchOutcome)> = join_all(runs).await;
        let should_abort = group
            .parallel
            .iter()
            .zip(results.iter())
            .any(|(step, (_, outcome))| !outcome.success && step.error_strategy.unwrap_or(self.config.error_strategy) == ErrorStrategy::Abort);

        let (traces, outcomes): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        (traces, outcomes, should_abort)
    }
}

#[async_trait]
impl Handler for ChainHandler {
    async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
        if self.config.steps.is_empty() {
            return Err(GatewayError::InvalidChain(format!("chain '{}' has no steps", self.config.chain_id)));
        }
        Ok(())
    }

    async fn execute(&mut self, request: &Request) -> Result<Response> {
        let original_payload = Value::Object(request.payload.clone());
        let mut previous_output = original_payload.clone();
        let mut step_outputs: Map<String, Value> = Map::new();
        let mut trace = Vec::new();
        let started = Instant::now();

        for step_kind in &self.config.steps {
            if self.stopped.load(Ordering::Acquire) {
                return Err(GatewayError::HandlerFailed("stopped before chain completed".to_string()));
            }

            match step_kind {
                StepKind::Sequential(step) => {
                    let outcome = self.run_sequential_step(step, request, &original_payload, &previous_output, &step_outputs).await;
                    let phase = outcome.trace.outcome;
                    let error_message = outcome.trace.error_message.clone();
                    trace.push(outcome.trace);

                    match phase {
                        TraceOutcome::Skipped => {}
                        TraceOutcome::Succeeded => {
                            if let Some(output) = outcome.output {
                                previous_output = merge(step.merge_strategy, &previous_output, &output);
                                step_outputs.insert(step.resolved_alias(), previous_output.clone());
                            }
                        }
                        TraceOutcome::Failed => match step.error_strategy.unwrap_or(self.config.error_strategy) {
                            ErrorStrategy::Abort => {
                                return Ok(chain_error_response(request.request_id, &trace, error_message.unwrap_or_default()));
                            }
                            ErrorStrategy::Skip => {}
                            ErrorStrategy::Fallback => {
                                let fallback = step.fallback_value.clone().unwrap_or(Value::Null);
                                previous_output = merge(step.merge_strategy, &previous_output, &fallback);
                                step_outputs.insert(step.resolved_alias(), previous_output.clone());
                            }
                        },
                    }
                }
                StepKind::Parallel(group) => {
                    let (branch_traces, outcomes, should_abort) =
                        self.run_parallel_group(group, request, &original_payload, &previous_output, &step_outputs).await;
                    trace.extend(branch_traces);

                    if should_abort {
                        return Ok(chain_error_response(request.request_id, &trace, "parallel branch failed and error_strategy is ABORT".to_string()));
                    }

                    for outcome in &outcomes {
                        step_outputs.insert(outcome.alias.clone(), outcome.output.clone());
                    }
                    previous_output = join(group.join_strategy, &outcomes);
                }
            }
        }

        let any_step_failed = trace.iter().any(|entry| entry.outcome == TraceOutcome::Failed);
        let data = serde_json::json!({ "result": previous_output, "trace": trace });
        let mut response = Response::success(request.request_id, self.config.chain_id.clone(), data, elapsed_ms(started));
        if any_step_failed {
            response.status = ResponseStatus::Partial;
        }
        Ok(response)
    }

    async fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }

    async fn cleanup(&mut self) {}
}

fn branch_failure(alias: String, error_strategy: ErrorStrategy, fallback_value: &Option<Value>, message: String, started: Instant) -> (TraceEntry, BranchOutcome) {
    let trace = TraceEntry { step: alias.clone(), outcome: TraceOutcome::Failed, duration_ms: elapsed_ms(started), error_message: Some(message) };
    let outcome = match error_strategy {
        ErrorStrategy::Fallback => BranchOutcome { alias, success: true, output: fallback_value.clone().unwrap_or(Value::Null) },
        ErrorStrategy::Skip | ErrorStrategy::Abort => BranchOutcome { alias, success: false, output: Value::Null },
    };
    (trace, outcome)
}

fn resolve_mapping(mapping: &Map<String, Value>, state: &VarState<'_>) -> Map<String, Value> {
    mapping.iter().map(|(key, value)| (key.clone(), variables::resolve(value, state))).collect()
}

/// A step without a `payload_mapping` passes `previous_output` through
/// unchanged; since `Request::payload` is itself a map, a non-object value
/// is wrapped under a single `value` key rather than dropped.
fn as_payload_map(previous_output: &Value) -> Map<String, Value> {
    match previous_output {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

fn build_sub_request(original: &Request, handler: &str, payload: Map<String, Value>) -> Request {
    Request {
        request_id: Uuid::new_v4(),
        request_type: handler.to_string(),
        api_key: original.api_key.clone(),
        payload,
        delivery_destination: None,
        ttl_minutes: original.ttl_minutes,
        source_channel: "chain".to_string(),
        received_at: None,
        resolved_user_id: original.resolved_user_id.clone(),
        response_channels: BTreeSet::new(),
        response_topic: None,
    }
}

fn chain_error_response(request_id: Uuid, trace: &[TraceEntry], message: String) -> Response {
    let mut response = Response::error(request_id, ResponseStatus::Error, message);
    response.data = Some(serde_json::json!({ "trace": trace }));
    response
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::chain::{JoinStrategy, MergeStrategy};
    use gateway_core::HandlerConfig;
    use gateway_dispatch::{AclEntry, AclTable, DispatcherConfig, HandlerRegistry, MultiChannelPublisher, RestBuffer, StreamingSessionManager};
    use gateway_runtime::Supervisor;
    use std::collections::{HashMap, HashSet};

    struct DoublingHandler;

    #[async_trait]
    impl Handler for DoublingHandler {
        async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, request: &Request) -> Result<Response> {
            let n = request.payload.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(Response::success(request.request_id, "DOUBLE", serde_json::json!({"n": n * 2}), 0))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    struct AlwaysFailsHandler;

    #[async_trait]
    impl Handler for AlwaysFailsHandler {
        async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
            Ok(())
        }

        async fn execute(&mut self, _request: &Request) -> Result<Response> {
            Err(GatewayError::HandlerFailed("boom".to_string()))
        }

        async fn stop(&mut self) {}
        async fn cleanup(&mut self) {}
    }

    fn handler_config(request_type: &str) -> HandlerConfig {
        HandlerConfig { request_type: request_type.to_string(), handler_identifier: request_type.to_lowercase(), ttl_minutes: 1.0, enabled: true, config: Map::new() }
    }

    async fn dispatcher_with(handlers: Vec<(&str, gateway_dispatch::HandlerFactory)>) -> Dispatcher {
        let registry = HandlerRegistry::new();
        for (request_type, factory) in handlers {
            registry.register(handler_config(request_type), factory).await;
        }

        let mut entries = HashMap::new();
        entries.insert("dgf-test-key-0001".to_string(), AclEntry { user_id: "tester".to_string(), allowed_request_types: HashSet::new() });

        Dispatcher::new(
            registry,
            AclTable::new(entries),
            Supervisor::new(),
            StreamingSessionManager::default(),
            MultiChannelPublisher::new(RestBuffer::new(), None, HashMap::new()),
            DispatcherConfig::default(),
        )
    }

    fn request(payload: Map<String, Value>) -> Request {
        Request {
            request_id: Uuid::new_v4(),
            request_type: "CHAIN".to_string(),
            api_key: "dgf-test-key-0001".to_string(),
            payload,
            delivery_destination: None,
            ttl_minutes: 1.0,
            source_channel: "rest".to_string(),
            received_at: None,
            resolved_user_id: None,
            response_channels: BTreeSet::new(),
            response_topic: None,
        }
    }

    fn sequential_step(step: u32, handler: &str, merge_strategy: MergeStrategy) -> SequentialStep {
        SequentialStep { step, handler: handler.to_string(), alias: None, payload_mapping: None, merge_strategy, when: None, error_strategy: None, fallback_value: None }
    }

    #[tokio::test]
    async fn two_sequential_steps_thread_previous_output_through() {
        let dispatcher = dispatcher_with(vec![("DOUBLE", Arc::new(|| Box::new(DoublingHandler) as Box<dyn Handler>))]).await;
        let config = ChainConfig {
            chain_id: "double-twice".to_string(),
            ttl_minutes: 1.0,
            error_strategy: ErrorStrategy::Abort,
            steps: vec![
                StepKind::Sequential(sequential_step(1, "DOUBLE", MergeStrategy::Replace)),
                StepKind::Sequential(sequential_step(2, "DOUBLE", MergeStrategy::Replace)),
            ],
            default_branch_timeout_ms: 60_000,
        };
        let mut handler = ChainHandler::new(config, dispatcher);
        handler.construct(Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert("n".to_string(), serde_json::json!(3));
        let response = handler.execute(&request(payload)).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data.unwrap()["result"]["n"], serde_json::json!(12));
    }

    #[tokio::test]
    async fn when_guard_false_skips_the_step() {
        let dispatcher = dispatcher_with(vec![("DOUBLE", Arc::new(|| Box::new(DoublingHandler) as Box<dyn Handler>))]).await;
        let mut step = sequential_step(1, "DOUBLE", MergeStrategy::Replace);
        step.when = Some("${payload.run} == true".to_string());
        let config = ChainConfig {
            chain_id: "guarded".to_string(),
            ttl_minutes: 1.0,
            error_strategy: ErrorStrategy::Abort,
            steps: vec![StepKind::Sequential(step)],
            default_branch_timeout_ms: 60_000,
        };
        let mut handler = ChainHandler::new(config, dispatcher);
        handler.construct(Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert("run".to_string(), serde_json::json!(false));
        payload.insert("n".to_string(), serde_json::json!(3));
        let response = handler.execute(&request(payload)).await.unwrap();

        let trace = response.data.unwrap()["trace"].clone();
        assert_eq!(trace[0]["outcome"], serde_json::json!("Skipped"));
    }

    #[tokio::test]
    async fn abort_error_strategy_short_circuits_the_chain() {
        let dispatcher = dispatcher_with(vec![("FAILS", Arc::new(|| Box::new(AlwaysFailsHandler) as Box<dyn Handler>))]).await;
        let config = ChainConfig {
            chain_id: "aborting".to_string(),
            ttl_minutes: 1.0,
            error_strategy: ErrorStrategy::Abort,
            steps: vec![StepKind::Sequential(sequential_step(1, "FAILS", MergeStrategy::Replace))],
            default_branch_timeout_ms: 60_000,
        };
        let mut handler = ChainHandler::new(config, dispatcher);
        handler.construct(Map::new()).await.unwrap();

        let response = handler.execute(&request(Map::new())).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Error);
    }

    #[tokio::test]
    async fn fallback_error_strategy_recovers_with_the_fallback_value() {
        let dispatcher = dispatcher_with(vec![("FAILS", Arc::new(|| Box::new(AlwaysFailsHandler) as Box<dyn Handler>))]).await;
        let mut step = sequential_step(1, "FAILS", MergeStrategy::Replace);
        step.error_strategy = Some(ErrorStrategy::Fallback);
        step.fallback_value = Some(serde_json::json!({"n": 0}));
        let config = ChainConfig {
            chain_id: "falling-back".to_string(),
            ttl_minutes: 1.0,
            error_strategy: ErrorStrategy::Abort,
            steps: vec![StepKind::Sequential(step)],
            default_branch_timeout_ms: 60_000,
        };
        let mut handler = ChainHandler::new(config, dispatcher);
        handler.construct(Map::new()).await.unwrap();

        let response = handler.execute(&request(Map::new())).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Partial);
        assert_eq!(response.data.unwrap()["result"], serde_json::json!({"n": 0}));
    }

    #[tokio::test]
    async fn parallel_group_joins_branch_outputs_by_alias() {
        let dispatcher = dispatcher_with(vec![("DOUBLE", Arc::new(|| Box::new(DoublingHandler) as Box<dyn Handler>))]).await;
        let mut branch_a = sequential_step(1, "DOUBLE", MergeStrategy::Replace);
        branch_a.alias = Some("a".to_string());
        let mut branch_b = sequential_step(1, "DOUBLE", MergeStrategy::Replace);
        branch_b.alias = Some("b".to_string());

        let group = ParallelGroup { parallel: vec![branch_a, branch_b], join_strategy: JoinStrategy::Keyed, branch_timeout_ms: None };
        let config = ChainConfig {
            chain_id: "fan-out".to_string(),
            ttl_minutes: 1.0,
            error_strategy: ErrorStrategy::Abort,
            steps: vec![StepKind::Parallel(group)],
            default_branch_timeout_ms: 60_000,
        };
        let mut handler = ChainHandler::new(config, dispatcher);
        handler.construct(Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert("n".to_string(), serde_json::json!(5));
        let response = handler.execute(&request(payload)).await.unwrap();

        let result = response.data.unwrap()["result"].clone();
        assert_eq!(result["a"]["n"], serde_json::json!(10));
        assert_eq!(result["b"]["n"], serde_json::json!(10));
    }

    #[tokio::test]
    async fn empty_chain_fails_construction() {
        let dispatcher = dispatcher_with(vec![]).await;
        let config = ChainConfig { chain_id: "empty".to_string(), ttl_minutes: 1.0, error_strategy: ErrorStrategy::Abort, steps: vec![], default_branch_timeout_ms: 60_000 };
        let mut handler = ChainHandler::new(config, dispatcher);
        assert!(handler.construct(Map::new()).await.is_err());
    }
}
