//! ---
//! prt_section: "06-sequence-orchestration"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sequence validation and lifecycle errors."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use r_prt_common::SinkError;
use r_prt_rt::RtError;
use thiserror::Error;

use crate::orchestrator::SequenceStatus;

/// Failures reported by sequence parsing, validation and the orchestrator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SequenceError {
    /// A run is already in progress.
    #[error("a sequence is already {0}")]
    AlreadyRunning(SequenceStatus),
    /// The sequence has no states.
    #[error("sequence {0} has no states")]
    NoStates(String),
    /// The sequence controls no streams.
    #[error("sequence {0} has no active streams")]
    NoActiveStreams(String),
    /// A state or target definition is unusable.
    #[error("invalid sequence definition: {0}")]
    Invalid(String),
    /// The definition document could not be parsed.
    #[error("cannot parse sequence: {0}")]
    Parse(String),
    /// Applying a state's phasors to a stream failed.
    #[error("state {state}: {source}")]
    Apply {
        /// Name of the state being entered.
        state: String,
        /// Underlying sink failure.
        #[source]
        source: SinkError,
    },
    /// The execution thread could not be spawned.
    #[error(transparent)]
    Worker(#[from] RtError),
}
