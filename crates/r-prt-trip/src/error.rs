//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Errors raised by rule parsing and GOOSE ingestion."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use thiserror::Error;

/// Shared result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Failures reported by the trip rule evaluator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    /// A rule was added without a name.
    #[error("rule name must not be empty")]
    EmptyName,
    /// The expression text is not valid; `position` is a byte offset.
    #[error("syntax error in rule {rule} at offset {position}: {message}")]
    Parse {
        /// Rule being added.
        rule: String,
        /// Byte offset of the offending token.
        position: usize,
        /// Human readable description.
        message: String,
    },
    /// No rule with the given name exists.
    #[error("rule {0} is not defined")]
    UnknownRule(String),
}

/// Failure of an external GOOSE decoder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("GOOSE decode failed: {0}")]
pub struct DecodeError(pub String);
