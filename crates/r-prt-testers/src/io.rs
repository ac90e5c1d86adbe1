//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Phasor output and trip observation shared by every tester."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use r_prt_common::{PhasorSet, PhasorSink, TesterConfig, TripSignal};
use r_prt_rt::StopFlag;
use r_prt_sequence::{
    wait_for_transition, wait_for_trip, TransitionCause, TransitionKind, WaitControl,
};

use crate::error::TesterError;

/// Where a tester writes phasors and where it looks for the relay's answer.
#[derive(Clone)]
pub struct TesterIo {
    sink: Arc<dyn PhasorSink>,
    trip: TripSignal,
    stream_id: String,
    frequency: f64,
    poll_interval: Duration,
}

impl fmt::Debug for TesterIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TesterIo")
            .field("stream_id", &self.stream_id)
            .field("frequency", &self.frequency)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl TesterIo {
    /// `frequency` is the stream's nominal frequency, used for every applied state.
    pub fn new(
        sink: Arc<dyn PhasorSink>,
        trip: TripSignal,
        stream_id: impl Into<String>,
        frequency: f64,
        config: &TesterConfig,
    ) -> Self {
        Self {
            sink,
            trip,
            stream_id: stream_id.into(),
            frequency,
            poll_interval: config.poll_interval,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Push `phasors` to the tester's stream at its nominal frequency.
    pub fn apply(&self, phasors: &PhasorSet) -> Result<(), TesterError> {
        self.apply_to(&self.stream_id, self.frequency, phasors)
    }

    pub fn apply_to(
        &self,
        stream_id: &str,
        frequency: f64,
        phasors: &PhasorSet,
    ) -> Result<(), TesterError> {
        self.sink.apply(stream_id, frequency, phasors)?;
        Ok(())
    }

    pub fn control(&self, stop: &StopFlag) -> WaitControl {
        WaitControl::new(stop.clone(), self.poll_interval)
    }

    /// Forget trips raised before the next fault injection.
    pub fn arm(&self) {
        self.trip.clear();
    }

    /// Hold the current output for `duration`, ignoring trips.
    pub fn hold(&self, duration: Duration, control: &WaitControl) -> Result<(), TesterError> {
        let outcome = wait_for_transition(TransitionKind::Time, duration, &self.trip, control);
        match outcome.cause {
            TransitionCause::Stopped => Err(TesterError::Interrupted),
            _ => Ok(()),
        }
    }

    /// Time to trip, or `None` when `timeout` passes first. Trips raised since the
    /// last [`arm`](Self::arm) count.
    pub fn await_trip(
        &self,
        timeout: Duration,
        control: &WaitControl,
    ) -> Result<Option<Duration>, TesterError> {
        let outcome = wait_for_trip(&self.trip, timeout, control);
        match outcome.cause {
            TransitionCause::Tripped => Ok(Some(outcome.elapsed)),
            TransitionCause::Stopped => Err(TesterError::Interrupted),
            TransitionCause::Elapsed | TransitionCause::TripTimeout => Ok(None),
        }
    }
}
