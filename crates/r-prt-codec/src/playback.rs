//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Recorded waveform sources for file playback streams."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Supplier of pre-recorded engineering values, one row per tick.
pub trait WaveformSource: Send {
    /// Next row of `channels` values, or `None` when the source is exhausted.
    fn next_sample(&mut self, channels: usize) -> Option<Vec<f64>>;
}

/// In-memory recording that loops back to the first row after the last.
///
/// Rows shorter than the stream's channel count are zero padded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedWaveform {
    #[serde(default)]
    pub sample_rate: Option<u32>,
    rows: Vec<Vec<f64>>,
    #[serde(skip)]
    cursor: usize,
}

impl RecordedWaveform {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self {
            sample_rate: None,
            rows,
            cursor: 0,
        }
    }

    /// Load a recording already converted to JSON (`{"sample_rate": 4800, "rows": [[...]]}`).
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read waveform file {}", path.display()))?;
        let waveform: Self = serde_json::from_str(&contents)
            .with_context(|| format!("invalid waveform JSON {}", path.display()))?;
        if waveform.rows.is_empty() {
            anyhow::bail!("waveform file {} contains no samples", path.display());
        }
        Ok(waveform)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl WaveformSource for RecordedWaveform {
    fn next_sample(&mut self, channels: usize) -> Option<Vec<f64>> {
        if self.rows.is_empty() {
            return None;
        }
        let mut row = self.rows[self.cursor].clone();
        row.resize(channels, 0.0);
        self.cursor = (self.cursor + 1) % self.rows.len();
        Some(row)
    }
}
