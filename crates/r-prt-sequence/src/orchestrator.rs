//! ---
//! prt_section: "06-sequence-orchestration"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sequence state machine and its execution thread."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use r_prt_common::{LastError, PhasorSink, SequenceConfig, TripSignal};
use r_prt_metrics::SequenceMetrics;
use r_prt_rt::{RtConfig, StopFlag, WorkerHandle};
use serde::Serialize;
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::error::SequenceError;
use crate::model::{Sequence, SequenceState};
use crate::transition::{wait_for_transition, PauseGate, TransitionCause, WaitControl};

/// Lifecycle of the orchestrator. `Idle` is initial; `Completed`, `Stopped` and
/// `Error` hold until the next successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SequenceStatus {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// The execution thread is stepping through states.
    Running,
    /// Held at the next poll point; state clocks stand still.
    Paused,
    /// Every state was left normally.
    Completed,
    /// A stop request ended the run.
    Stopped,
    /// The run failed; see `last_error`.
    Error,
}

impl SequenceStatus {
    /// Running or paused.
    pub fn is_active(self) -> bool {
        matches!(self, SequenceStatus::Running | SequenceStatus::Paused)
    }
}

/// Progress event emitted on every state entry and terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceProgress {
    /// Status at emission time.
    pub status: SequenceStatus,
    /// Index of the current state; `None` after the run ended.
    pub state_index: Option<usize>,
    /// Number of states in the sequence.
    pub total_states: usize,
    /// Name of the current state.
    pub state_name: Option<String>,
    /// Run time in seconds, paused time excluded.
    pub elapsed_secs: f64,
    /// Human readable description.
    pub message: String,
}

/// Receives progress events. Called from the execution thread; must not block.
pub trait ProgressSink: Send + Sync {
    /// Handle one event.
    fn on_progress(&self, progress: &SequenceProgress);
}

/// Progress sink that keeps every event.
#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Mutex<Vec<SequenceProgress>>,
}

impl ProgressLog {
    /// All events received so far.
    pub fn events(&self) -> Vec<SequenceProgress> {
        self.events.lock().clone()
    }
}

impl ProgressSink for ProgressLog {
    fn on_progress(&self, progress: &SequenceProgress) {
        self.events.lock().push(progress.clone());
    }
}

/// History entry for one visited state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRecord {
    /// Position in the sequence.
    pub index: usize,
    /// State name.
    pub name: String,
    /// Run time at entry, seconds.
    pub entered_at_secs: f64,
    /// Run time at exit, seconds; `None` while the state is current.
    pub left_at_secs: Option<f64>,
    /// Why the state was left. A trip timeout is distinguishable from a trip here.
    pub cause: Option<TransitionCause>,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceSnapshot {
    /// Current status.
    pub status: SequenceStatus,
    /// Name of the loaded sequence.
    pub sequence_name: Option<String>,
    /// Index of the current state.
    pub current_state: Option<usize>,
    /// Name of the current state.
    pub current_state_name: Option<String>,
    /// Number of states in the loaded sequence.
    pub total_states: usize,
    /// Run time in seconds, paused time excluded.
    pub elapsed_secs: f64,
    /// Visited states in order.
    pub history: Vec<StateRecord>,
    /// Most recent failure.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct RunClock {
    started: Option<Instant>,
    paused_total: Duration,
    paused_since: Option<Instant>,
}

impl RunClock {
    fn start(&mut self) {
        *self = Self {
            started: Some(Instant::now()),
            ..Self::default()
        };
    }

    fn pause(&mut self) {
        self.paused_since.get_or_insert_with(Instant::now);
    }

    fn resume(&mut self) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += since.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let paused = self.paused_total + self.paused_since.map(|s| s.elapsed()).unwrap_or_default();
        started.elapsed().saturating_sub(paused)
    }
}

#[derive(Debug, Default)]
struct RunState {
    status: SequenceStatus,
    sequence_name: Option<String>,
    state_names: Vec<String>,
    current_state: Option<usize>,
    history: Vec<StateRecord>,
    clock: RunClock,
}

impl RunState {
    fn progress(&self, message: impl Into<String>) -> SequenceProgress {
        SequenceProgress {
            status: self.status,
            state_index: self.current_state,
            total_states: self.state_names.len(),
            state_name: self
                .current_state
                .and_then(|index| self.state_names.get(index).cloned()),
            elapsed_secs: self.clock.elapsed().as_secs_f64(),
            message: message.into(),
        }
    }
}

struct Shared {
    run: Mutex<RunState>,
    pause: PauseGate,
    last_error: LastError,
    progress: Option<Arc<dyn ProgressSink>>,
    metrics: Option<SequenceMetrics>,
}

impl Shared {
    fn emit(&self, progress: SequenceProgress) {
        if let Some(sink) = &self.progress {
            sink.on_progress(&progress);
        }
    }

    /// Move to a terminal status unless one was already recorded.
    fn finish(&self, status: SequenceStatus, message: String) {
        let progress = {
            let mut run = self.run.lock();
            if !run.status.is_active() {
                return;
            }
            run.clock.resume();
            run.status = status;
            run.current_state = None;
            run.progress(message)
        };
        self.pause.resume();
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(&status.to_string());
        }
        self.emit(progress);
    }
}

/// Drives streams through the states of one sequence at a time.
///
/// The orchestrator owns a single execution thread. Phasor snapshots are pushed
/// through the injected [`PhasorSink`] and trip transitions poll the shared
/// [`TripSignal`], so the orchestrator never touches codec internals.
pub struct SequenceOrchestrator {
    sink: Arc<dyn PhasorSink>,
    trip: TripSignal,
    config: SequenceConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl fmt::Debug for SequenceOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceOrchestrator")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SequenceOrchestrator {
    /// Orchestrator applying phasors through `sink` and watching `trip`.
    pub fn new(
        sink: Arc<dyn PhasorSink>,
        trip: TripSignal,
        config: SequenceConfig,
        progress: Option<Arc<dyn ProgressSink>>,
        metrics: Option<SequenceMetrics>,
    ) -> Self {
        Self {
            sink,
            trip,
            config,
            shared: Arc::new(Shared {
                run: Mutex::new(RunState::default()),
                pause: PauseGate::new(),
                last_error: LastError::default(),
                progress,
                metrics,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Validate `sequence` and start executing it.
    ///
    /// Rejected without any state change while a run is active or when the
    /// sequence has no states or no active streams.
    pub fn start(&self, sequence: Sequence) -> Result<(), SequenceError> {
        let mut slot = self.worker.lock();
        let status = self.status();
        if status.is_active() {
            return Err(self
                .shared
                .last_error
                .capture(SequenceError::AlreadyRunning(status)));
        }
        if let Err(err) = sequence.validate() {
            warn!(sequence = %sequence.name, error = %err, "sequence rejected");
            return Err(self.shared.last_error.capture(err));
        }
        if let Some(previous) = slot.take() {
            previous.stop();
        }

        self.trip.clear();
        self.shared.pause.resume();
        let progress = {
            let mut run = self.shared.run.lock();
            *run = RunState {
                status: SequenceStatus::Running,
                sequence_name: Some(sequence.name.clone()),
                state_names: sequence.states.iter().map(|s| s.name.clone()).collect(),
                ..RunState::default()
            };
            run.clock.start();
            run.progress(format!("sequence {} started", sequence.name))
        };

        self.shared.emit(progress);

        let name = sequence.name.clone();
        let executor = Executor {
            sequence,
            sink: Arc::clone(&self.sink),
            trip: self.trip.clone(),
            shared: Arc::clone(&self.shared),
            poll_interval: self.config.poll_interval,
        };
        match WorkerHandle::spawn(RtConfig::new("sequence-exec"), move |stop| executor.run(stop)) {
            Ok(handle) => {
                *slot = Some(handle);
                info!(sequence = %name, "sequence started");
                Ok(())
            }
            Err(err) => {
                let err = self.shared.last_error.capture(SequenceError::from(err));
                self.shared.finish(SequenceStatus::Error, err.to_string());
                Err(err)
            }
        }
    }

    /// Hold the run at its next poll point. Only valid while running.
    pub fn pause(&self) -> bool {
        let progress = {
            let mut run = self.shared.run.lock();
            if run.status != SequenceStatus::Running {
                return false;
            }
            run.status = SequenceStatus::Paused;
            run.clock.pause();
            self.shared.pause.pause();
            run.progress("sequence paused")
        };
        info!("sequence paused");
        self.shared.emit(progress);
        true
    }

    /// Continue a paused run.
    pub fn resume(&self) -> bool {
        let progress = {
            let mut run = self.shared.run.lock();
            if run.status != SequenceStatus::Paused {
                return false;
            }
            run.status = SequenceStatus::Running;
            run.clock.resume();
            self.shared.pause.resume();
            run.progress("sequence resumed")
        };
        info!("sequence resumed");
        self.shared.emit(progress);
        true
    }

    /// Stop and join the execution thread, forcing `Stopped`.
    ///
    /// Returns `false` when no run was active; terminal states are left as they are.
    pub fn stop(&self) -> bool {
        let handle = self.worker.lock().take();
        let was_active = self.status().is_active();
        if let Some(handle) = handle {
            handle.stop();
        }
        if was_active {
            self.shared
                .finish(SequenceStatus::Stopped, "sequence stopped".into());
            info!("sequence stopped");
        }
        was_active
    }

    /// Current status.
    pub fn status(&self) -> SequenceStatus {
        self.shared.run.lock().status
    }

    /// Full view including history.
    pub fn snapshot(&self) -> SequenceSnapshot {
        let run = self.shared.run.lock();
        SequenceSnapshot {
            status: run.status,
            sequence_name: run.sequence_name.clone(),
            current_state: run.current_state,
            current_state_name: run
                .current_state
                .and_then(|index| run.state_names.get(index).cloned()),
            total_states: run.state_names.len(),
            elapsed_secs: run.clock.elapsed().as_secs_f64(),
            history: run.history.clone(),
            last_error: self.shared.last_error.get(),
        }
    }

    /// Most recent failure.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.get()
    }
}

impl Drop for SequenceOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Executor {
    sequence: Sequence,
    sink: Arc<dyn PhasorSink>,
    trip: TripSignal,
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl Executor {
    fn run(self, stop: StopFlag) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.execute(&stop)));
        match outcome {
            Ok(Ok(status)) => {
                let message = format!("sequence {} {}", self.sequence.name, status);
                self.shared.finish(status, message);
            }
            Ok(Err(err)) => self.fail(err.to_string()),
            Err(payload) => self.fail(format!("execution panicked: {}", panic_message(&*payload))),
        }
    }

    fn fail(&self, message: String) {
        error!(sequence = %self.sequence.name, error = %message, "sequence failed");
        self.shared.last_error.record(message.clone());
        self.shared.finish(SequenceStatus::Error, message);
    }

    fn execute(&self, stop: &StopFlag) -> Result<SequenceStatus, SequenceError> {
        let control = WaitControl::new(stop.clone(), self.poll_interval)
            .with_pause(self.shared.pause.clone());

        for (index, state) in self.sequence.states.iter().enumerate() {
            if stop.is_requested() {
                return Ok(SequenceStatus::Stopped);
            }
            while self.shared.pause.is_paused() {
                if stop.is_requested() {
                    return Ok(SequenceStatus::Stopped);
                }
                thread::sleep(self.poll_interval);
            }

            self.enter(index, state);
            self.apply(state)?;

            let outcome = wait_for_transition(state.transition, state.duration, &self.trip, &control);
            self.leave(index, outcome.cause);
            debug!(
                state = %state.name,
                cause = %outcome.cause,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "state left"
            );
            if outcome.cause == TransitionCause::Stopped {
                return Ok(SequenceStatus::Stopped);
            }
        }
        Ok(SequenceStatus::Completed)
    }

    fn enter(&self, index: usize, state: &SequenceState) {
        let progress = {
            let mut run = self.shared.run.lock();
            run.current_state = Some(index);
            let entered_at_secs = run.clock.elapsed().as_secs_f64();
            run.history.push(StateRecord {
                index,
                name: state.name.clone(),
                entered_at_secs,
                left_at_secs: None,
                cause: None,
            });
            run.progress(format!("entered state {}", state.name))
        };
        if let Some(metrics) = &self.shared.metrics {
            metrics.record_state_entry(&state.transition.to_string());
        }
        info!(state = %state.name, index, transition = %state.transition, "state entered");
        self.shared.emit(progress);
    }

    fn apply(&self, state: &SequenceState) -> Result<(), SequenceError> {
        for stream in &self.sequence.active_streams {
            let Some(target) = state.targets.get(stream) else {
                warn!(state = %state.name, stream = %stream, "no target for stream, skipping");
                continue;
            };
            self.sink
                .apply(stream, target.frequency, &target.phasors)
                .map_err(|source| SequenceError::Apply {
                    state: state.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn leave(&self, index: usize, cause: TransitionCause) {
        let mut run = self.shared.run.lock();
        let left_at = run.clock.elapsed().as_secs_f64();
        if let Some(record) = run.history.iter_mut().rev().find(|r| r.index == index) {
            record.left_at_secs = Some(left_at);
            record.cause = Some(cause);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StreamTarget;
    use r_prt_common::{PhasorSet, SinkError};

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<(String, f64)>>,
    }

    impl PhasorSink for RecordingSink {
        fn apply(&self, stream_id: &str, frequency: f64, _: &PhasorSet) -> Result<(), SinkError> {
            if stream_id == "missing" {
                return Err(SinkError::UnknownStream(stream_id.into()));
            }
            self.applied.lock().push((stream_id.into(), frequency));
            Ok(())
        }
    }

    struct PanickingSink;

    impl PhasorSink for PanickingSink {
        fn apply(&self, _: &str, _: f64, _: &PhasorSet) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    fn config() -> SequenceConfig {
        SequenceConfig {
            poll_interval: Duration::from_millis(5),
        }
    }

    fn target() -> StreamTarget {
        StreamTarget::new(60.0, PhasorSet::balanced(63.5, 1.0, 0.0))
    }

    fn wait_terminal(orchestrator: &SequenceOrchestrator) -> SequenceStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        while orchestrator.status().is_active() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        orchestrator.status()
    }

    #[test]
    fn runs_states_in_order_and_skips_missing_targets() {
        let sink = Arc::new(RecordingSink::default());
        let log = Arc::new(ProgressLog::default());
        let orchestrator = SequenceOrchestrator::new(
            sink.clone(),
            TripSignal::new(),
            config(),
            Some(log.clone() as Arc<dyn ProgressSink>),
            None,
        );
        let sequence = Sequence::new("two", vec!["MU01".into(), "MU02".into()])
            .with_state(
                SequenceState::timed("a", Duration::from_millis(20)).with_target("MU01", target()),
            )
            .with_state(
                SequenceState::timed("b", Duration::from_millis(20))
                    .with_target("MU02", StreamTarget::new(50.0, PhasorSet::default())),
            );
        orchestrator.start(sequence).unwrap();
        assert_eq!(wait_terminal(&orchestrator), SequenceStatus::Completed);

        assert_eq!(
            *sink.applied.lock(),
            vec![("MU01".to_string(), 60.0), ("MU02".to_string(), 50.0)]
        );
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.history[1].cause, Some(TransitionCause::Elapsed));
        assert_eq!(snapshot.current_state, None);

        let events = log.events();
        assert!(events.iter().any(|e| e.state_name.as_deref() == Some("b")));
        assert_eq!(events.last().map(|e| e.status), Some(SequenceStatus::Completed));
    }

    #[test]
    fn sink_failure_moves_to_error() {
        let orchestrator = SequenceOrchestrator::new(
            Arc::new(RecordingSink::default()),
            TripSignal::new(),
            config(),
            None,
            None,
        );
        let sequence = Sequence::new("bad", vec!["missing".into()]).with_state(
            SequenceState::timed("a", Duration::from_millis(10)).with_target("missing", target()),
        );
        orchestrator.start(sequence).unwrap();
        assert_eq!(wait_terminal(&orchestrator), SequenceStatus::Error);
        assert!(orchestrator.last_error().unwrap().contains("missing"));
    }

    #[test]
    fn panic_is_contained() {
        let orchestrator =
            SequenceOrchestrator::new(Arc::new(PanickingSink), TripSignal::new(), config(), None, None);
        let sequence = Sequence::new("boom", vec!["MU01".into()]).with_state(
            SequenceState::timed("a", Duration::from_millis(10)).with_target("MU01", target()),
        );
        orchestrator.start(sequence).unwrap();
        assert_eq!(wait_terminal(&orchestrator), SequenceStatus::Error);
        assert!(orchestrator.last_error().unwrap().contains("sink exploded"));
    }

    #[test]
    fn pause_and_resume_only_from_matching_states() {
        let orchestrator = SequenceOrchestrator::new(
            Arc::new(RecordingSink::default()),
            TripSignal::new(),
            config(),
            None,
            None,
        );
        assert!(!orchestrator.pause());
        assert!(!orchestrator.resume());

        let sequence = Sequence::new("long", vec!["MU01".into()])
            .with_state(SequenceState::timed("hold", Duration::from_secs(10)));
        orchestrator.start(sequence).unwrap();
        assert!(!orchestrator.resume());
        assert!(orchestrator.pause());
        assert_eq!(orchestrator.status(), SequenceStatus::Paused);
        assert!(!orchestrator.pause());
        assert!(orchestrator.resume());
        assert!(orchestrator.stop());
        assert_eq!(orchestrator.status(), SequenceStatus::Stopped);
    }

    #[test]
    fn stop_while_paused_is_prompt() {
        let orchestrator = SequenceOrchestrator::new(
            Arc::new(RecordingSink::default()),
            TripSignal::new(),
            config(),
            None,
            None,
        );
        let sequence = Sequence::new("long", vec!["MU01".into()])
            .with_state(SequenceState::until_trip("wait", Duration::from_secs(10)));
        orchestrator.start(sequence).unwrap();
        orchestrator.pause();
        let started = Instant::now();
        assert!(orchestrator.stop());
        assert!(started.elapsed() < Duration::from_secs(1));
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, SequenceStatus::Stopped);
        assert_eq!(snapshot.current_state, None);
    }
}
