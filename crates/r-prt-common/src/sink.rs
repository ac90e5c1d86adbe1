//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Narrow capabilities injected between components."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use thiserror::Error;

use crate::phasor::PhasorSet;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SinkError {
    #[error("stream {0} is not registered")]
    UnknownStream(String),
    #[error("phasor update rejected for stream {stream}: {reason}")]
    Rejected { stream: String, reason: String },
}

/// Capability to push a frequency and phasor snapshot into a stream.
///
/// The update must become visible to the next codec tick as a whole.
pub trait PhasorSink: Send + Sync {
    fn apply(&self, stream_id: &str, frequency: f64, phasors: &PhasorSet)
        -> Result<(), SinkError>;
}
