//! ---
//! prt_section: "05-waveform-analysis"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Waveform and analysis frames and the sinks that receive them."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::dft::ChannelAnalysis;

/// Raw buffered samples of one channel, timestamps relative to the oldest sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelWaveform {
    pub channel: String,
    pub samples: Vec<f64>,
    pub timestamps: Vec<f64>,
}

/// Oscilloscope-style snapshot emitted at the waveform cadence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformFrame {
    pub stream_id: String,
    pub channels: Vec<ChannelWaveform>,
}

/// Result of one analysis cycle. Never empty when delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisFrame {
    pub stream_id: String,
    pub sample_rate: f64,
    pub samples_per_cycle: usize,
    pub channels: Vec<ChannelAnalysis>,
}

impl AnalysisFrame {
    pub fn channel(&self, name: &str) -> Option<&ChannelAnalysis> {
        self.channels.iter().find(|c| c.channel == name)
    }
}

pub trait WaveformSink: Send + Sync {
    fn on_waveform(&self, frame: &WaveformFrame);
}

pub trait AnalysisSink: Send + Sync {
    fn on_analysis(&self, frame: &AnalysisFrame);
}

/// Keeps the latest waveform and every analysis frame; for tests and polling hosts.
#[derive(Debug, Default)]
pub struct CollectingSink {
    waveform_count: AtomicUsize,
    latest_waveform: Mutex<Option<WaveformFrame>>,
    analyses: Mutex<Vec<AnalysisFrame>>,
}

impl CollectingSink {
    pub fn waveform_count(&self) -> usize {
        self.waveform_count.load(Ordering::SeqCst)
    }

    pub fn latest_waveform(&self) -> Option<WaveformFrame> {
        self.latest_waveform.lock().clone()
    }

    pub fn analyses(&self) -> Vec<AnalysisFrame> {
        self.analyses.lock().clone()
    }

    pub fn latest_analysis(&self) -> Option<AnalysisFrame> {
        self.analyses.lock().last().cloned()
    }
}

impl WaveformSink for CollectingSink {
    fn on_waveform(&self, frame: &WaveformFrame) {
        *self.latest_waveform.lock() = Some(frame.clone());
        self.waveform_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl AnalysisSink for CollectingSink {
    fn on_analysis(&self, frame: &AnalysisFrame) {
        self.analyses.lock().push(frame.clone());
    }
}
