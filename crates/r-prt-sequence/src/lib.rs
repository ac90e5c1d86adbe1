//! ---
//! prt_section: "06-sequence-orchestration"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Test sequence orchestration kernel."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Multi-state protection test sequences.
//!
//! A [`Sequence`] is an ordered list of [`SequenceState`]s. The
//! [`SequenceOrchestrator`] applies each state's phasor snapshot to the streams it
//! controls and leaves the state on elapsed time or on a relay trip. The wait
//! primitives in [`transition`] are shared with the relay testers.
#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod orchestrator;
pub mod transition;

pub use error::SequenceError;
pub use model::{Sequence, SequenceState, StreamTarget, TransitionKind};
pub use orchestrator::{
    ProgressLog, ProgressSink, SequenceOrchestrator, SequenceProgress, SequenceSnapshot,
    SequenceStatus, StateRecord,
};
pub use transition::{
    wait_for_transition, wait_for_trip, PauseGate, TransitionCause, WaitControl, WaitOutcome,
};
