//! ---
//! prt_section: "06-sequence-orchestration"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sequence definitions: states, transitions and per-stream targets."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::time::Duration;

use indexmap::IndexMap;
use r_prt_common::{PhasorSet, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use strum::{Display, EnumString};

use crate::error::SequenceError;

/// How a state is left.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TransitionKind {
    /// Leave once the state's duration has elapsed.
    #[default]
    Time,
    /// Leave on the first trip; the duration is the timeout.
    #[serde(alias = "goose", alias = "trip")]
    GooseTrip,
}

fn default_frequency() -> f64 {
    60.0
}

/// Frequency and phasor snapshot applied to one stream on state entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTarget {
    /// Signal frequency in Hz.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    /// Per-channel phasors.
    pub phasors: PhasorSet,
}

impl StreamTarget {
    /// Target with the given frequency and phasors.
    pub fn new(frequency: f64, phasors: PhasorSet) -> Self {
        Self { frequency, phasors }
    }
}

/// One step of a sequence.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceState {
    /// Display name reported in progress events.
    pub name: String,
    /// Dwell time for `Time`, timeout for `GooseTrip`. Seconds in documents.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub duration: Duration,
    /// Transition condition.
    #[serde(default)]
    pub transition: TransitionKind,
    /// Targets keyed by stream id. Streams without an entry are left untouched.
    #[serde(default)]
    pub targets: IndexMap<String, StreamTarget>,
}

impl SequenceState {
    /// State left after `duration`.
    pub fn timed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            transition: TransitionKind::Time,
            targets: IndexMap::new(),
        }
    }

    /// State left on trip, or after `timeout` without one.
    pub fn until_trip(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transition: TransitionKind::GooseTrip,
            ..Self::timed(name, timeout)
        }
    }

    /// Add or replace the target for `stream`.
    pub fn with_target(mut self, stream: impl Into<String>, target: StreamTarget) -> Self {
        self.targets.insert(stream.into(), target);
        self
    }
}

/// Ordered states plus the streams they drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
    /// Stream ids controlled by this sequence.
    #[serde(default)]
    pub active_streams: Vec<String>,
    /// States executed in order.
    #[serde(default)]
    pub states: Vec<SequenceState>,
}

impl Sequence {
    /// Empty sequence over `active_streams`.
    pub fn new(name: impl Into<String>, active_streams: Vec<String>) -> Self {
        Self {
            name: name.into(),
            active_streams,
            states: Vec::new(),
        }
    }

    /// Append a state.
    pub fn with_state(mut self, state: SequenceState) -> Self {
        self.states.push(state);
        self
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, SequenceError> {
        let sequence: Self =
            toml::from_str(text).map_err(|err| SequenceError::Parse(err.to_string()))?;
        sequence.validate()?;
        Ok(sequence)
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(text: &str) -> Result<Self, SequenceError> {
        let sequence: Self =
            serde_json::from_str(text).map_err(|err| SequenceError::Parse(err.to_string()))?;
        sequence.validate()?;
        Ok(sequence)
    }

    /// Reject sequences that cannot run.
    pub fn validate(&self) -> Result<(), SequenceError> {
        if self.states.is_empty() {
            return Err(SequenceError::NoStates(self.name.clone()));
        }
        if self.active_streams.is_empty() {
            return Err(SequenceError::NoActiveStreams(self.name.clone()));
        }
        if let Some(index) = self.active_streams.iter().position(|s| s.trim().is_empty()) {
            return Err(SequenceError::Invalid(format!(
                "sequence {}: active stream {} has a blank id",
                self.name, index
            )));
        }
        for state in &self.states {
            for (stream, target) in &state.targets {
                if !(target.frequency > 0.0) {
                    return Err(SequenceError::Invalid(format!(
                        "state {} stream {}: frequency {} must be positive",
                        state.name, stream, target.frequency
                    )));
                }
                if target.phasors.len() > MAX_CHANNELS {
                    return Err(SequenceError::Invalid(format!(
                        "state {} stream {}: {} phasors exceed {} channels",
                        state.name,
                        stream,
                        target.phasors.len(),
                        MAX_CHANNELS
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
name = "ag-fault"
active_streams = ["MU01"]

[[states]]
name = "prefault"
duration = 0.5

[states.targets.MU01]
phasors = [
  { magnitude = 63.5, angle_deg = 0.0 },
  { magnitude = 63.5, angle_deg = -120.0 },
  { magnitude = 63.5, angle_deg = 120.0 },
]

[[states]]
name = "fault"
duration = 2.0
transition = "goose_trip"

[states.targets.MU01]
frequency = 59.5
phasors = [{ magnitude = 10.0, angle_deg = 0.0 }]
"#;

    #[test]
    fn parses_toml_document() {
        let sequence = Sequence::from_toml_str(DOCUMENT).unwrap();
        assert_eq!(sequence.states.len(), 2);
        assert_eq!(sequence.states[0].transition, TransitionKind::Time);
        assert_eq!(sequence.states[0].duration, Duration::from_millis(500));
        assert_eq!(sequence.states[0].targets["MU01"].frequency, 60.0);
        assert_eq!(sequence.states[1].transition, TransitionKind::GooseTrip);
        assert_eq!(sequence.states[1].targets["MU01"].frequency, 59.5);
    }

    #[test]
    fn json_round_trip_keeps_definition() {
        let sequence = Sequence::from_toml_str(DOCUMENT).unwrap();
        let json = serde_json::to_string(&sequence).unwrap();
        assert_eq!(Sequence::from_json_str(&json).unwrap(), sequence);
    }

    #[test]
    fn rejects_empty_sequences() {
        let empty = Sequence::new("empty", vec!["MU01".into()]);
        assert_eq!(empty.validate(), Err(SequenceError::NoStates("empty".into())));
        let no_streams = Sequence::new("idle", Vec::new())
            .with_state(SequenceState::timed("s", Duration::from_secs(1)));
        assert_eq!(
            no_streams.validate(),
            Err(SequenceError::NoActiveStreams("idle".into()))
        );
        assert!(matches!(
            Sequence::from_toml_str("name = 3"),
            Err(SequenceError::Parse(_))
        ));
    }

    #[test]
    fn rejects_blank_active_stream_ids() {
        let mixed = Sequence::new("mixed", vec!["MU01".into(), "  ".into()])
            .with_state(SequenceState::timed("s", Duration::from_secs(1)));
        match mixed.validate() {
            Err(SequenceError::Invalid(message)) => assert!(message.contains("blank"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
        let document = DOCUMENT.replace(r#"["MU01"]"#, r#"["MU01", ""]"#);
        assert!(matches!(
            Sequence::from_toml_str(&document),
            Err(SequenceError::Invalid(_))
        ));
    }

    #[test]
    fn transition_kind_parses_aliases() {
        assert_eq!("GOOSE_TRIP".parse::<TransitionKind>().unwrap(), TransitionKind::GooseTrip);
        assert_eq!(TransitionKind::GooseTrip.to_string(), "goose_trip");
    }
}
