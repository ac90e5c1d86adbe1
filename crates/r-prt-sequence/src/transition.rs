//! ---
//! prt_section: "06-sequence-orchestration"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Cancellable time and trip waits shared by sequences and relay testers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use r_prt_common::TripSignal;
use r_prt_rt::StopFlag;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::TransitionKind;

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransitionCause {
    /// A time transition reached its duration.
    Elapsed,
    /// The trip signal was observed and consumed.
    Tripped,
    /// A trip transition reached its timeout without a trip.
    TripTimeout,
    /// A stop was requested.
    Stopped,
}

/// Outcome of a wait together with the active (unpaused) time it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Why the wait ended.
    pub cause: TransitionCause,
    /// Time spent waiting, paused intervals excluded.
    pub elapsed: Duration,
}

/// Shared pause switch. While paused, waits hold and their clocks stand still.
#[derive(Debug, Clone, Default)]
pub struct PauseGate(Arc<AtomicBool>);

impl PauseGate {
    /// Gate in the running position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold waits at their next poll.
    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Release held waits.
    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether waits are currently held.
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation and pacing inputs of a wait.
#[derive(Debug, Clone)]
pub struct WaitControl {
    /// Checked at every poll; a request ends the wait with [`TransitionCause::Stopped`].
    pub stop: StopFlag,
    /// Pause switch; testers pass a gate that is never paused.
    pub pause: PauseGate,
    /// Poll interval, about 50 ms for sequences.
    pub poll_interval: Duration,
}

impl WaitControl {
    /// Control that is never paused.
    pub fn new(stop: StopFlag, poll_interval: Duration) -> Self {
        Self {
            stop,
            pause: PauseGate::new(),
            poll_interval,
        }
    }

    /// Use `pause` as the pause switch.
    pub fn with_pause(mut self, pause: PauseGate) -> Self {
        self.pause = pause;
        self
    }
}

/// Block until the state's transition condition holds.
///
/// `GooseTrip` clears the trip signal first so only trips raised after entry count;
/// if `duration` passes without one the wait ends with
/// [`TransitionCause::TripTimeout`].
pub fn wait_for_transition(
    kind: TransitionKind,
    duration: Duration,
    trip: &TripSignal,
    control: &WaitControl,
) -> WaitOutcome {
    match kind {
        TransitionKind::Time => poll_until(None, duration, control),
        TransitionKind::GooseTrip => {
            trip.clear();
            poll_until(Some(trip), duration, control)
        }
    }
}

/// Block until a trip is observed or `timeout` passes. The signal is not cleared
/// first, so a trip raised just before the call still counts.
pub fn wait_for_trip(trip: &TripSignal, timeout: Duration, control: &WaitControl) -> WaitOutcome {
    poll_until(Some(trip), timeout, control)
}

fn poll_until(trip: Option<&TripSignal>, duration: Duration, control: &WaitControl) -> WaitOutcome {
    let mut active = Duration::ZERO;
    let mut last = Instant::now();
    loop {
        if control.stop.is_requested() {
            return WaitOutcome {
                cause: TransitionCause::Stopped,
                elapsed: active,
            };
        }
        let now = Instant::now();
        let paused = control.pause.is_paused();
        if !paused {
            active += now - last;
        }
        last = now;

        if !paused {
            if let Some(trip) = trip {
                if trip.take() {
                    return WaitOutcome {
                        cause: TransitionCause::Tripped,
                        elapsed: active,
                    };
                }
            }
            if active >= duration {
                let cause = if trip.is_some() {
                    TransitionCause::TripTimeout
                } else {
                    TransitionCause::Elapsed
                };
                return WaitOutcome {
                    cause,
                    elapsed: active,
                };
            }
        }

        let remaining = duration.saturating_sub(active);
        let nap = if paused {
            control.poll_interval
        } else {
            control.poll_interval.min(remaining)
        };
        thread::sleep(nap.max(Duration::from_micros(100)));
    }
}
