//! ---
//! prt_section: "06-sequence-orchestration"
//! prt_subsection: "tests"
//! prt_type: "source"
//! prt_scope: "tests"
//! prt_description: "Transition timing, rejection and stop semantics of the orchestrator."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use r_prt_common::{PhasorSet, PhasorSink, SequenceConfig, SinkError, TestContext, TripSignal};
use r_prt_metrics::{new_registry, SequenceMetrics};
use r_prt_sequence::{
    Sequence, SequenceError, SequenceOrchestrator, SequenceState, SequenceStatus, StreamTarget,
    TransitionCause,
};

#[derive(Default)]
struct TimedSink {
    applied: Mutex<Vec<(String, Instant)>>,
}

impl PhasorSink for TimedSink {
    fn apply(&self, stream_id: &str, _: f64, _: &PhasorSet) -> Result<(), SinkError> {
        self.applied.lock().push((stream_id.to_owned(), Instant::now()));
        Ok(())
    }
}

fn two_state_sequence() -> Sequence {
    let target = StreamTarget::new(60.0, PhasorSet::balanced(63.5, 1.0, 20.0));
    Sequence::new("time-then-trip", vec!["MU01".into()])
        .with_state(
            SequenceState::timed("prefault", Duration::from_millis(200))
                .with_target("MU01", target.clone()),
        )
        .with_state(
            SequenceState::until_trip("fault", Duration::from_secs(5)).with_target("MU01", target),
        )
}

fn orchestrator(sink: Arc<TimedSink>, trip: TripSignal) -> SequenceOrchestrator {
    SequenceOrchestrator::new(sink, trip, SequenceConfig::default(), None, None)
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn trip_ends_second_state_early() -> Result<()> {
    let context = TestContext::new();
    let sink = Arc::new(TimedSink::default());
    let orchestrator = orchestrator(sink.clone(), context.trip_signal());

    let started = Instant::now();
    orchestrator.start(two_state_sequence())?;
    assert!(wait_until(Duration::from_secs(2), || sink.applied.lock().len() == 2));
    let second_entry = sink.applied.lock()[1].1 - started;
    assert!(second_entry >= Duration::from_millis(190), "entered at {:?}", second_entry);
    assert!(second_entry < Duration::from_millis(600), "entered at {:?}", second_entry);
    assert_eq!(orchestrator.snapshot().current_state, Some(1));

    thread::sleep(Duration::from_millis(100));
    let tripped_at = Instant::now();
    context.trip_signal().set();
    assert!(wait_until(Duration::from_secs(2), || {
        orchestrator.status() == SequenceStatus::Completed
    }));
    assert!(tripped_at.elapsed() < Duration::from_secs(1));

    let history = orchestrator.snapshot().history;
    assert_eq!(history[0].cause, Some(TransitionCause::Elapsed));
    assert_eq!(history[1].cause, Some(TransitionCause::Tripped));
    assert!(!context.trip_signal().is_set());
    Ok(())
}

#[test]
fn missing_trip_times_out() -> Result<()> {
    let metrics = SequenceMetrics::new(new_registry())?;
    let sink = Arc::new(TimedSink::default());
    let orchestrator = SequenceOrchestrator::new(
        sink,
        TripSignal::new(),
        SequenceConfig::default(),
        None,
        Some(metrics.clone()),
    );
    let sequence = Sequence::new("timeout", vec!["MU01".into()])
        .with_state(SequenceState::until_trip("fault", Duration::from_millis(300)));

    let started = Instant::now();
    orchestrator.start(sequence)?;
    assert!(wait_until(Duration::from_secs(3), || {
        orchestrator.status() == SequenceStatus::Completed
    }));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(290), "elapsed {:?}", elapsed);

    let history = orchestrator.snapshot().history;
    assert_eq!(history[0].cause, Some(TransitionCause::TripTimeout));
    assert_eq!(metrics.outcomes("completed"), 1);
    Ok(())
}

#[test]
fn invalid_sequences_leave_status_idle() {
    let orchestrator = orchestrator(Arc::new(TimedSink::default()), TripSignal::new());

    let no_states = Sequence::new("empty", vec!["MU01".into()]);
    assert_eq!(
        orchestrator.start(no_states),
        Err(SequenceError::NoStates("empty".into()))
    );
    assert_eq!(orchestrator.status(), SequenceStatus::Idle);

    let no_streams = Sequence::new("no-streams", Vec::new())
        .with_state(SequenceState::timed("s", Duration::from_millis(10)));
    assert_eq!(
        orchestrator.start(no_streams),
        Err(SequenceError::NoActiveStreams("no-streams".into()))
    );
    assert_eq!(orchestrator.status(), SequenceStatus::Idle);
    assert!(orchestrator.last_error().is_some());

    let blank_stream = Sequence::new("blank", vec!["MU01".into(), "".into()])
        .with_state(SequenceState::timed("s", Duration::from_millis(10)));
    assert!(matches!(
        orchestrator.start(blank_stream),
        Err(SequenceError::Invalid(_))
    ));
    assert_eq!(orchestrator.status(), SequenceStatus::Idle);
}

#[test]
fn second_start_is_rejected_while_running() -> Result<()> {
    let orchestrator = orchestrator(Arc::new(TimedSink::default()), TripSignal::new());
    orchestrator.start(two_state_sequence())?;
    assert_eq!(
        orchestrator.start(two_state_sequence()),
        Err(SequenceError::AlreadyRunning(SequenceStatus::Running))
    );
    assert_eq!(orchestrator.status(), SequenceStatus::Running);
    orchestrator.stop();
    Ok(())
}

#[test]
fn stop_twice_is_safe() -> Result<()> {
    let orchestrator = orchestrator(Arc::new(TimedSink::default()), TripSignal::new());
    assert!(!orchestrator.stop());
    assert_eq!(orchestrator.status(), SequenceStatus::Idle);

    orchestrator.start(two_state_sequence())?;
    let started = Instant::now();
    assert!(orchestrator.stop());
    assert!(started.elapsed() < Duration::from_secs(1));
    let first = orchestrator.snapshot();
    assert_eq!(first.status, SequenceStatus::Stopped);

    assert!(!orchestrator.stop());
    let second = orchestrator.snapshot();
    assert_eq!(second.status, first.status);
    assert_eq!(second.history, first.history);
    assert_eq!(second.current_state, None);

    // A stopped orchestrator accepts a new run.
    orchestrator.start(two_state_sequence())?;
    assert_eq!(orchestrator.status(), SequenceStatus::Running);
    orchestrator.stop();
    Ok(())
}
