//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Configuration errors and the last-error slot shared by stateful components."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use parking_lot::Mutex;
use thiserror::Error;

/// Configuration errors shared by the component crates.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} value {value} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Most recent failure reported by a stateful component.
///
/// The slot is the diagnostic surface host layers poll; it is overwritten on every
/// recorded failure and never cleared implicitly by successful operations.
#[derive(Debug, Default)]
pub struct LastError {
    slot: Mutex<Option<String>>,
}

impl LastError {
    pub fn record(&self, message: impl Into<String>) {
        *self.slot.lock() = Some(message.into());
    }

    /// Record the error's display text and hand the error back to the caller.
    pub fn capture<E: std::fmt::Display>(&self, err: E) -> E {
        self.record(err.to_string());
        err
    }

    pub fn get(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_keeps_most_recent() {
        let slot = LastError::default();
        assert!(slot.get().is_none());
        slot.record("first");
        let err = slot.capture(ConfigError::Empty { field: "sv_id" });
        assert_eq!(err, ConfigError::Empty { field: "sv_id" });
        assert_eq!(slot.get().as_deref(), Some("sv_id must not be empty"));
        slot.clear();
        assert!(slot.get().is_none());
    }
}
