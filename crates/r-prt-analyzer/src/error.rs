//! ---
//! prt_section: "05-waveform-analysis"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Analyzer lifecycle errors."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use r_prt_rt::RtError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyzerError {
    #[error("analyzer is already running on stream {0}")]
    AlreadyRunning(String),
    #[error("stream id must not be empty")]
    EmptyStreamId,
    #[error("sample rate {0} must be positive")]
    InvalidSampleRate(f64),
    #[error(transparent)]
    Worker(#[from] RtError),
}
