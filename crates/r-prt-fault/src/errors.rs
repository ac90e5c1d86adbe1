//! ---
//! prt_section: "04-fault-models"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Parse errors for fault descriptions."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FaultError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FaultError {
    #[error("unknown fault type {0:?}; expected one of AG BG CG AB BC CA ABG BCG CAG ABC")]
    UnknownFaultType(String),
}
