//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Relay tester errors."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use r_prt_common::{ConfigError, SinkError};
use r_prt_rt::RtError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TesterError {
    #[error("a test run is already in progress")]
    AlreadyRunning,
    #[error("no test points supplied")]
    NoPoints,
    #[error("invalid test point: {0}")]
    InvalidPoint(String),
    #[error("invalid tester settings: {0}")]
    InvalidSettings(String),
    /// A stop request ended the point before it finished.
    #[error("test point interrupted by stop request")]
    Interrupted,
    #[error("cannot apply phasors: {0}")]
    Apply(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Worker(#[from] RtError),
}
