//! Supervised worker: one spawned task per accepted request, carrying its
//! own TTL timer and cooperative-cancellation stop signal (spec §4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_core::handler::UpdateSink;
use gateway_core::{Handler, HandlerPhase, HandlerState, Request};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::metrics::WorkerMetrics;

/// The terminal phase a worker task settled in, used for metrics and
/// supervisor bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    /// `execute` returned `Ok`.
    Completed,
    /// `construct` or `execute` returned `Err`.
    Failed,
    /// The TTL elapsed before `execute` returned.
    TimedOut,
    /// `stop()` was called and honored before completion.
    Stopped,
}

/// A flag a worker task polls cooperatively; set by [`WorkerHandle::stop`].
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// `true` once `stop()` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// A handle to one spawned supervised worker, returned to whoever spawned it
/// (usually the dispatcher or the supervisor). Dropping the handle does not
/// stop the worker; call [`WorkerHandle::stop`] explicitly.
pub struct WorkerHandle {
    handler_id: String,
    state: Arc<RwLock<HandlerState>>,
    stop_signal: StopSignal,
    join: JoinHandle<TerminalOutcome>,
}

impl WorkerHandle {
    /// The id this worker was spawned under.
    #[must_use]
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// Snapshot the worker's current lifecycle state.
    pub async fn state(&self) -> HandlerState {
        self.state.read().await.clone()
    }

    /// Request cooperative cancellation. The worker finishes its current
    /// `execute` poll cycle, then transitions to `Stopped` on its next check
    /// of the stop signal; it does not abort the task forcibly.
    pub fn stop(&self) {
        self.stop_signal.trigger();
    }

    /// Wait for the worker task to reach a terminal phase.
    ///
    /// # Errors
    ///
    /// Returns the `JoinError` if the spawned task panicked.
    pub async fn join(self) -> Result<TerminalOutcome, tokio::task::JoinError> {
        self.join.await
    }
}

/// Spawn a supervised worker for `request`, running `handler` through its
/// full `construct` → `execute` → `cleanup` lifecycle under a TTL timer
/// (spec §4.5).
///
/// The returned [`WorkerHandle`]'s `state()` reflects `HandlerPhase`
/// transitions as they happen; the supervisor is expected to poll or snapshot
/// it into its history ring.
pub fn spawn_worker(
    handler_id: String,
    mut handler: Box<dyn Handler>,
    request: Request,
    config: serde_json::Map<String, serde_json::Value>,
) -> WorkerHandle {
    let state = Arc::new(RwLock::new(HandlerState::queued(handler_id.clone(), &request)));
    let stop_signal = StopSignal::new();
    let ttl = Duration::from_secs_f64((request.ttl_minutes * 60.0).max(0.0));

    WorkerMetrics::record_spawned();

    let task_state = Arc::clone(&state);
    let task_stop = stop_signal.clone();
    let join = tokio::spawn(async move {
        let outcome = run_lifecycle(&mut *handler, &request, config, &task_state, &task_stop, ttl).await;
        handler.cleanup().await;
        outcome
    });

    WorkerHandle {
        handler_id,
        state,
        stop_signal,
        join,
    }
}

async fn run_lifecycle(
    handler: &mut dyn Handler,
    request: &Request,
    config: serde_json::Map<String, serde_json::Value>,
    state: &Arc<RwLock<HandlerState>>,
    stop: &StopSignal,
    ttl: Duration,
) -> TerminalOutcome {
    if let Some(outcome) = run_preamble(handler, config, state, stop).await {
        return outcome;
    }

    let mut execution = handler.execute(request);

    let outcome = tokio::select! {
        result = &mut execution => {
            match result {
                Ok(response) => {
                    let mut guard = state.write().await;
                    guard.response_data = response.data;
                    guard.finish(HandlerPhase::Completed, true, None);
                    TerminalOutcome::Completed
                }
                Err(err) => {
                    let mut guard = state.write().await;
                    guard.finish(HandlerPhase::Failed, false, Some(err.to_string()));
                    TerminalOutcome::Failed
                }
            }
        }
        () = tokio::time::sleep(ttl) => {
            drop(execution);
            handler.stop().await;
            let mut guard = state.write().await;
            guard.finish(HandlerPhase::TimedOut, false, Some(format!("ttl of {ttl:?} elapsed")));
            TerminalOutcome::TimedOut
        }
    };

    let guard = state.read().await;
    record_terminal(&guard);
    outcome
}

/// Spawn a streaming-capable supervised worker. Identical lifecycle to
/// [`spawn_worker`] except `execute_streaming` is invoked instead of
/// `execute`, pushing updates through `sink` as it runs (spec §4.5
/// streaming, §4.8).
pub fn spawn_streaming_worker(
    handler_id: String,
    mut handler: Box<dyn Handler>,
    request: Request,
    config: serde_json::Map<String, serde_json::Value>,
    sink: UpdateSink,
) -> WorkerHandle {
    let state = Arc::new(RwLock::new(HandlerState::queued(handler_id.clone(), &request)));
    let stop_signal = StopSignal::new();
    let ttl = Duration::from_secs_f64((request.ttl_minutes * 60.0).max(0.0));

    WorkerMetrics::record_spawned();

    let task_state = Arc::clone(&state);
    let task_stop = stop_signal.clone();
    let join = tokio::spawn(async move {
        let outcome = run_streaming_lifecycle(&mut *handler, &request, config, &task_state, &task_stop, ttl, sink).await;
        handler.cleanup().await;
        outcome
    });

    WorkerHandle {
        handler_id,
        state,
        stop_signal,
        join,
    }
}

/// Runs `construct`, honoring a stop request raised before `execute`/
/// `execute_streaming` begins. Returns `Some(outcome)` if the lifecycle
/// reached a terminal state already; `None` means the caller should proceed
/// to invoke the handler's execution method.
async fn run_preamble(
    handler: &mut dyn Handler,
    config: serde_json::Map<String, serde_json::Value>,
    state: &Arc<RwLock<HandlerState>>,
    stop: &StopSignal,
) -> Option<TerminalOutcome> {
    {
        let mut guard = state.write().await;
        guard.phase = HandlerPhase::Constructing;
        guard.started_at = Some(chrono::Utc::now());
    }

    if let Err(err) = handler.construct(config).await {
        let mut guard = state.write().await;
        guard.finish(HandlerPhase::Failed, false, Some(err.to_string()));
        record_terminal(&guard);
        return Some(TerminalOutcome::Failed);
    }

    if stop.is_stopped() {
        handler.stop().await;
        let mut guard = state.write().await;
        guard.finish(HandlerPhase::Stopped, false, Some("stopped before execution".to_string()));
        record_terminal(&guard);
        return Some(TerminalOutcome::Stopped);
    }

    let mut guard = state.write().await;
    guard.phase = HandlerPhase::Executing;
    None
}

async fn run_streaming_lifecycle(
    handler: &mut dyn Handler,
    request: &Request,
    config: serde_json::Map<String, serde_json::Value>,
    state: &Arc<RwLock<HandlerState>>,
    stop: &StopSignal,
    ttl: Duration,
    sink: UpdateSink,
) -> TerminalOutcome {
    if let Some(outcome) = run_preamble(handler, config, state, stop).await {
        return outcome;
    }

    let mut execution = handler.execute_streaming(request, sink);

    let outcome = tokio::select! {
        result = &mut execution => {
            match result {
                Ok(response) => {
                    let mut guard = state.write().await;
                    guard.response_data = response.data;
                    guard.finish(HandlerPhase::Completed, true, None);
                    TerminalOutcome::Completed
                }
                Err(err) => {
                    let mut guard = state.write().await;
                    guard.finish(HandlerPhase::Failed, false, Some(err.to_string()));
                    TerminalOutcome::Failed
                }
            }
        }
        () = tokio::time::sleep(ttl) => {
            drop(execution);
            handler.stop().await;
            let mut guard = state.write().await;
            guard.finish(HandlerPhase::TimedOut, false, Some(format!("ttl of {ttl:?} elapsed")));
            TerminalOutcome::TimedOut
        }
    };

    let guard = state.read().await;
    record_terminal(&guard);
    outcome
}

fn record_terminal(state: &HandlerState) {
    let duration = Duration::from_millis(state.duration_ms.unwrap_or(0));
    let outcome = match state.phase {
        HandlerPhase::Completed => TerminalOutcome::Completed,
        HandlerPhase::TimedOut => TerminalOutcome::TimedOut,
        HandlerPhase::Stopped => TerminalOutcome::Stopped,
        _ => TerminalOutcome::Failed,
    };
    WorkerMetrics::record_terminal(outcome, duration);
}
