//! ---
//! prt_section: "05-waveform-analysis"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sample ingestion, ring buffers and the two-cadence analysis worker."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;
use r_prt_common::{AnalyzerConfig, LastError};
use r_prt_rt::{RtConfig, StopFlag, WorkerHandle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dft::DftEngine;
use crate::error::AnalyzerError;
use crate::ring::SampleRing;
use crate::sink::{AnalysisFrame, AnalysisSink, ChannelWaveform, WaveformFrame, WaveformSink};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerStatus {
    pub running: bool,
    pub stream_id: Option<String>,
    pub sample_rate: f64,
    pub samples_per_cycle: usize,
    pub channels: Vec<String>,
    pub analysis_cycles: u64,
    /// Non-finite samples stored as zero since the last start.
    pub non_finite_samples: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Buffers {
    stream_id: Option<String>,
    sample_rate: f64,
    samples_per_cycle: usize,
    channels: IndexMap<String, SampleRing>,
    non_finite: u64,
}

struct Shared {
    buffers: Mutex<Buffers>,
    engine: Mutex<DftEngine>,
    running: AtomicBool,
    cycles: AtomicU64,
    max_harmonic: usize,
}

impl Shared {
    fn waveform(&self) -> Option<WaveformFrame> {
        let buffers = self.buffers.lock();
        let stream_id = buffers.stream_id.clone()?;
        let channels = buffers
            .channels
            .iter()
            .map(|(name, ring)| ChannelWaveform {
                channel: name.clone(),
                samples: ring.values(),
                timestamps: ring.relative_timestamps(),
            })
            .collect();
        Some(WaveformFrame {
            stream_id,
            channels,
        })
    }

    fn analyze(&self) -> Option<AnalysisFrame> {
        // Copy the windows out so ingestion is not blocked by the transforms.
        let (stream_id, sample_rate, samples_per_cycle, windows) = {
            let buffers = self.buffers.lock();
            let stream_id = buffers.stream_id.clone()?;
            let windows: Vec<(String, Vec<f64>)> = buffers
                .channels
                .iter()
                .filter_map(|(name, ring)| {
                    ring.latest(buffers.samples_per_cycle)
                        .map(|window| (name.clone(), window))
                })
                .collect();
            (
                stream_id,
                buffers.sample_rate,
                buffers.samples_per_cycle,
                windows,
            )
        };
        if windows.is_empty() {
            return None;
        }

        let mut engine = self.engine.lock();
        let channels = windows
            .iter()
            .map(|(name, window)| engine.analyze(name, window, sample_rate, self.max_harmonic))
            .collect();
        Some(AnalysisFrame {
            stream_id,
            sample_rate,
            samples_per_cycle,
            channels,
        })
    }
}

/// Buffers the samples of one selected stream and measures them periodically.
///
/// Each channel keeps exactly two nominal cycles; analysis runs on the most recent
/// cycle of every channel that has one.
pub struct WaveformAnalyzer {
    config: AnalyzerConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
    waveform_sink: Option<Arc<dyn WaveformSink>>,
    analysis_sink: Option<Arc<dyn AnalysisSink>>,
    last_error: LastError,
}

impl fmt::Debug for WaveformAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaveformAnalyzer")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WaveformAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let shared = Arc::new(Shared {
            buffers: Mutex::new(Buffers::default()),
            engine: Mutex::new(DftEngine::new()),
            running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            max_harmonic: config.max_harmonic,
        });
        Self {
            config,
            shared,
            worker: Mutex::new(None),
            waveform_sink: None,
            analysis_sink: None,
            last_error: LastError::default(),
        }
    }

    pub fn with_sinks(
        mut self,
        waveform: Option<Arc<dyn WaveformSink>>,
        analysis: Option<Arc<dyn AnalysisSink>>,
    ) -> Self {
        self.waveform_sink = waveform;
        self.analysis_sink = analysis;
        self
    }

    /// Select `stream_id`, clear all buffers and start the worker.
    pub fn start(&self, stream_id: &str, sample_rate: f64) -> Result<(), AnalyzerError> {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            let current = self.shared.buffers.lock().stream_id.clone().unwrap_or_default();
            return Err(self.last_error.capture(AnalyzerError::AlreadyRunning(current)));
        }
        if stream_id.trim().is_empty() {
            return Err(self.last_error.capture(AnalyzerError::EmptyStreamId));
        }
        if !(sample_rate > 0.0) {
            return Err(self.last_error.capture(AnalyzerError::InvalidSampleRate(sample_rate)));
        }

        let samples_per_cycle = (sample_rate / self.config.nominal_frequency)
            .round()
            .max(1.0) as usize;
        {
            let mut buffers = self.shared.buffers.lock();
            buffers.stream_id = Some(stream_id.to_owned());
            buffers.sample_rate = sample_rate;
            buffers.samples_per_cycle = samples_per_cycle;
            buffers.channels.clear();
            buffers.non_finite = 0;
        }
        self.shared.cycles.store(0, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let worker_loop = AnalyzerLoop {
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            waveform_sink: self.waveform_sink.clone(),
            analysis_sink: self.analysis_sink.clone(),
        };
        match WorkerHandle::spawn(RtConfig::new("analyzer"), move |stop| worker_loop.run(stop)) {
            Ok(handle) => {
                *slot = Some(handle);
                info!(stream = %stream_id, sample_rate, samples_per_cycle, "analyzer started");
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(self.last_error.capture(AnalyzerError::from(err)))
            }
        }
    }

    /// Stop and join the worker. Returns `false` when it was not running.
    ///
    /// Buffers and the selected stream are kept for status views.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.worker.lock().take() else {
            return false;
        };
        self.shared.running.store(false, Ordering::SeqCst);
        handle.stop();
        info!("analyzer stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Append one sample. Ignored unless running on `stream_id`.
    pub fn process_sample(&self, stream_id: &str, channel: &str, value: f64, timestamp: f64) {
        self.process_samples(stream_id, [(channel, value)], timestamp);
    }

    /// Append one sample per channel under a single lock.
    pub fn process_samples<'a, I>(&self, stream_id: &str, samples: I, timestamp: f64)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        if !self.is_running() {
            return;
        }
        let mut buffers = self.shared.buffers.lock();
        if buffers.stream_id.as_deref() != Some(stream_id) {
            return;
        }
        let capacity = 2 * buffers.samples_per_cycle;
        for (channel, value) in samples {
            // Zero keeps every channel's window aligned with its timestamps.
            let value = if value.is_finite() {
                value
            } else {
                buffers.non_finite += 1;
                debug!(stream = %stream_id, channel, value, "non-finite sample stored as zero");
                0.0
            };
            if let Some(ring) = buffers.channels.get_mut(channel) {
                ring.push(value, timestamp);
            } else {
                let mut ring = SampleRing::new(capacity);
                ring.push(value, timestamp);
                buffers.channels.insert(channel.to_owned(), ring);
            }
        }
    }

    /// Run one analysis immediately, outside the worker cadence.
    pub fn analyze_now(&self) -> Option<AnalysisFrame> {
        self.shared.analyze()
    }

    pub fn waveform_snapshot(&self) -> Option<WaveformFrame> {
        self.shared.waveform()
    }

    pub fn status(&self) -> AnalyzerStatus {
        let buffers = self.shared.buffers.lock();
        AnalyzerStatus {
            running: self.is_running(),
            stream_id: buffers.stream_id.clone(),
            sample_rate: buffers.sample_rate,
            samples_per_cycle: buffers.samples_per_cycle,
            channels: buffers.channels.keys().cloned().collect(),
            analysis_cycles: self.shared.cycles.load(Ordering::SeqCst),
            non_finite_samples: buffers.non_finite,
            last_error: self.last_error.get(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

impl Drop for WaveformAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AnalyzerLoop {
    shared: Arc<Shared>,
    config: AnalyzerConfig,
    waveform_sink: Option<Arc<dyn WaveformSink>>,
    analysis_sink: Option<Arc<dyn AnalysisSink>>,
}

impl AnalyzerLoop {
    fn run(self, stop: StopFlag) {
        let mut next_waveform = Instant::now();
        let mut next_analysis = Instant::now() + self.config.analysis_interval;

        while !stop.is_requested() {
            let now = Instant::now();
            if now >= next_waveform {
                if let (Some(sink), Some(frame)) = (&self.waveform_sink, self.shared.waveform()) {
                    sink.on_waveform(&frame);
                }
                next_waveform = now + self.config.waveform_interval;
            }
            if now >= next_analysis {
                match self.shared.analyze() {
                    Some(frame) => {
                        self.shared.cycles.fetch_add(1, Ordering::SeqCst);
                        debug!(channels = frame.channels.len(), "analysis cycle complete");
                        if let Some(sink) = &self.analysis_sink {
                            sink.on_analysis(&frame);
                        }
                    }
                    None => debug!("analysis skipped: no channel holds a full cycle"),
                }
                let late = now.saturating_duration_since(next_analysis);
                if late > self.config.analysis_interval {
                    warn!(late_ms = late.as_millis() as u64, "analysis cadence overrun");
                }
                next_analysis = now + self.config.analysis_interval;
            }
            thread::sleep(self.config.idle_sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_rejects_bad_arguments() {
        let analyzer = WaveformAnalyzer::new(AnalyzerConfig::default());
        assert_eq!(analyzer.start("", 4800.0), Err(AnalyzerError::EmptyStreamId));
        assert_eq!(
            analyzer.start("MU01", 0.0),
            Err(AnalyzerError::InvalidSampleRate(0.0))
        );
        assert!(analyzer.last_error().unwrap().contains("sample rate"));
        assert!(!analyzer.is_running());

        analyzer.start("MU01", 4800.0).unwrap();
        assert_eq!(
            analyzer.start("MU02", 4800.0),
            Err(AnalyzerError::AlreadyRunning("MU01".into()))
        );
        assert!(analyzer.stop());
    }

    #[test]
    fn ignores_other_streams_and_idle_state() {
        let analyzer = WaveformAnalyzer::new(AnalyzerConfig::default());
        analyzer.process_sample("MU01", "Va", 1.0, 0.0);
        assert!(analyzer.status().channels.is_empty());

        analyzer.start("MU01", 4800.0).unwrap();
        analyzer.process_sample("MU02", "Va", 1.0, 0.0);
        analyzer.process_sample("MU01", "Ia", 1.0, 0.0);
        let status = analyzer.status();
        assert_eq!(status.channels, vec!["Ia".to_string()]);
        assert_eq!(status.samples_per_cycle, 80);
        analyzer.stop();
    }

    #[test]
    fn non_finite_samples_keep_channels_aligned() {
        let analyzer = WaveformAnalyzer::new(AnalyzerConfig::default());
        analyzer.start("MU01", 4800.0).unwrap();
        analyzer.process_samples("MU01", [("Va", 1.0), ("Ia", 2.0)], 0.0);
        analyzer.process_samples("MU01", [("Va", f64::NAN), ("Ia", 2.0)], 0.001);
        analyzer.process_samples("MU01", [("Va", f64::INFINITY), ("Ia", 2.0)], 0.002);

        let waveform = analyzer.waveform_snapshot().unwrap();
        let va = &waveform.channels[0];
        let ia = &waveform.channels[1];
        assert_eq!(va.samples, vec![1.0, 0.0, 0.0]);
        assert_eq!(va.timestamps, ia.timestamps);
        assert_eq!(analyzer.status().non_finite_samples, 2);

        analyzer.stop();
        analyzer.start("MU01", 4800.0).unwrap();
        assert_eq!(analyzer.status().non_finite_samples, 0);
        analyzer.stop();
    }

    #[test]
    fn buffers_hold_two_cycles() {
        let analyzer = WaveformAnalyzer::new(AnalyzerConfig::default());
        analyzer.start("MU01", 4800.0).unwrap();
        for n in 0..500 {
            analyzer.process_sample("MU01", "Va", n as f64, n as f64 / 4800.0);
        }
        let snapshot = analyzer.waveform_snapshot().unwrap();
        assert_eq!(snapshot.channels[0].samples.len(), 160);
        assert_eq!(snapshot.channels[0].samples[0], 340.0);
        assert_eq!(snapshot.channels[0].timestamps[0], 0.0);
        analyzer.stop();
    }

    #[test]
    fn partial_cycle_yields_no_analysis() {
        let analyzer = WaveformAnalyzer::new(AnalyzerConfig::default());
        analyzer.start("MU01", 4800.0).unwrap();
        for n in 0..79 {
            analyzer.process_sample("MU01", "Va", 1.0, n as f64);
        }
        assert!(analyzer.analyze_now().is_none());
        analyzer.process_sample("MU01", "Va", 1.0, 79.0);
        assert!(analyzer.analyze_now().is_some());
        analyzer.stop();
    }
}
