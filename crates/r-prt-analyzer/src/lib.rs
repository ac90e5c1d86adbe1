//! ---
//! prt_section: "05-waveform-analysis"
//! prt_subsection: "01-bootstrap"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Waveform analyzer exports."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Closed-loop measurement of what the codec transmitted: per-channel ring buffers,
//! a one-cycle DFT for fundamental and harmonics, and THD.

pub mod analyzer;
pub mod dft;
pub mod error;
pub mod ring;
pub mod sink;

pub use analyzer::{AnalyzerStatus, WaveformAnalyzer};
pub use dft::{
    zero_crossing_frequency, ChannelAnalysis, DftEngine, HarmonicComponent, DEFAULT_FREQUENCY,
};
pub use error::AnalyzerError;
pub use ring::SampleRing;
pub use sink::{
    AnalysisFrame, AnalysisSink, ChannelWaveform, CollectingSink, WaveformFrame, WaveformSink,
};
