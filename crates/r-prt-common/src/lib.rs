//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Shared configuration, logging, phasor and trip signal primitives."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Core shared primitives for the R-PRT workspace.
//! This crate exposes configuration loading, logging bootstrap, the phasor
//! vocabulary shared by the codec, orchestrator and testers, and the trip
//! signal context handed to every consumer.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod phasor;
pub mod signal;
pub mod sink;
pub mod time;

pub use config::{
    AnalyzerConfig, AppConfig, CodecConfig, GooseConfig, LoggingConfig, SequenceConfig,
    TesterConfig,
};
pub use error::{ConfigError, LastError};
pub use logging::{init_tracing, LogFormat};
pub use metrics::{JitterHistogram, JitterSummary, LoopTimingReporter};
pub use phasor::{Harmonic, HarmonicSpec, Phasor, PhasorSet, MAX_CHANNELS};
pub use signal::{TestContext, TripSignal};
pub use sink::{PhasorSink, SinkError};
