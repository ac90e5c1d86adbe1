//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Single Sampled Value stream: state, lifecycle and tick."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use r_prt_common::{ConfigError, HarmonicSpec, LastError, PhasorSet};
use r_prt_metrics::CodecMetrics;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DataSourceMode, StreamConfig};
use crate::error::CodecError;
use crate::frame::{encode_frame, scale_values, synthesize_values};
use crate::playback::WaveformSource;
use crate::transport::RawFrameSender;

/// Snapshot of a stream for status views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub sv_id: String,
    pub running: bool,
    pub sample_counter: u64,
    pub frequency: f64,
    pub sample_rate: u32,
    pub mode: DataSourceMode,
    pub channels: usize,
    pub phasors: PhasorSet,
    pub last_error: Option<String>,
}

struct StreamState {
    config: StreamConfig,
    frequency: f64,
    phasors: PhasorSet,
    harmonics: HarmonicSpec,
    running: bool,
    counter: u64,
    source: Option<Box<dyn WaveformSource>>,
    send_failing: bool,
    buffer: BytesMut,
}

/// One Sampled Value publisher.
///
/// Every field a tick reads sits behind one lock, so a tick sees either the whole
/// previous phasor set or the whole new one.
pub struct SvStream {
    id: String,
    state: Mutex<StreamState>,
    sender: Arc<dyn RawFrameSender>,
    metrics: Option<CodecMetrics>,
    last_error: LastError,
}

impl fmt::Debug for SvStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvStream")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl SvStream {
    pub fn new(
        config: StreamConfig,
        sender: Arc<dyn RawFrameSender>,
        metrics: Option<CodecMetrics>,
    ) -> Result<Self, CodecError> {
        config.validate()?;
        Ok(Self {
            id: config.sv_id.clone(),
            state: Mutex::new(StreamState {
                frequency: config.nominal_frequency,
                config,
                phasors: PhasorSet::default(),
                harmonics: HarmonicSpec::default(),
                running: false,
                counter: 0,
                source: None,
                send_failing: false,
                buffer: BytesMut::new(),
            }),
            sender,
            metrics,
            last_error: LastError::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> StreamConfig {
        self.state.lock().config.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn sample_counter(&self) -> u64 {
        self.state.lock().counter
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// Replace the configuration. Only allowed while stopped.
    pub fn update_config(&self, config: StreamConfig) -> Result<(), CodecError> {
        let result = self.try_update_config(config);
        result.map_err(|err| self.last_error.capture(err))
    }

    fn try_update_config(&self, config: StreamConfig) -> Result<(), CodecError> {
        config.validate()?;
        if config.sv_id != self.id {
            return Err(CodecError::IdMismatch {
                expected: self.id.clone(),
                found: config.sv_id,
            });
        }
        let mut state = self.state.lock();
        if state.running {
            return Err(CodecError::StreamRunning(self.id.clone()));
        }
        state.frequency = config.nominal_frequency;
        state.config = config;
        debug!(stream = %self.id, "configuration replaced");
        Ok(())
    }

    pub fn set_phasors(&self, phasors: PhasorSet) -> Result<(), CodecError> {
        let mut state = self.state.lock();
        let channels = state.config.channels.len();
        if phasors.len() > channels {
            return Err(self.last_error.capture(CodecError::TooManyPhasors {
                stream: self.id.clone(),
                provided: phasors.len(),
                channels,
            }));
        }
        state.phasors = phasors;
        Ok(())
    }

    pub fn set_harmonics(&self, harmonics: HarmonicSpec) -> Result<(), CodecError> {
        let mut state = self.state.lock();
        let channels = state.config.channels.len();
        if harmonics.channel_count() > channels {
            return Err(self.last_error.capture(CodecError::TooManyPhasors {
                stream: self.id.clone(),
                provided: harmonics.channel_count(),
                channels,
            }));
        }
        state.harmonics = harmonics;
        Ok(())
    }

    pub fn set_frequency(&self, frequency: f64) -> Result<(), CodecError> {
        check_frequency(frequency).map_err(|err| self.last_error.capture(CodecError::from(err)))?;
        self.state.lock().frequency = frequency;
        Ok(())
    }

    /// Replace frequency and phasors together, as one update.
    pub fn apply(&self, frequency: f64, phasors: PhasorSet) -> Result<(), CodecError> {
        check_frequency(frequency).map_err(|err| self.last_error.capture(CodecError::from(err)))?;
        let mut state = self.state.lock();
        let channels = state.config.channels.len();
        if phasors.len() > channels {
            return Err(self.last_error.capture(CodecError::TooManyPhasors {
                stream: self.id.clone(),
                provided: phasors.len(),
                channels,
            }));
        }
        state.frequency = frequency;
        state.phasors = phasors;
        Ok(())
    }

    pub fn set_source(&self, source: Box<dyn WaveformSource>) {
        self.state.lock().source = Some(source);
    }

    /// Begin publishing from sample zero. Starting a running stream is a no-op.
    pub fn start(&self) -> Result<(), CodecError> {
        let mut state = self.state.lock();
        if state.running {
            return Ok(());
        }
        if state.config.mode == DataSourceMode::FilePlayback && state.source.is_none() {
            return Err(self
                .last_error
                .capture(CodecError::MissingSource(self.id.clone())));
        }
        state.counter = 0;
        state.send_failing = false;
        state.running = true;
        info!(stream = %self.id, sample_rate = state.config.sample_rate, "stream started");
        Ok(())
    }

    /// Stop publishing. Returns whether the stream was running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        state.running = false;
        info!(stream = %self.id, samples = state.counter, "stream stopped");
        true
    }

    /// Produce and transmit one frame. Returns `false` without side effects when the
    /// stream is not running.
    ///
    /// A failed send still consumes the sample slot: the counter advances so the
    /// wire timeline stays aligned with wall-clock ticks.
    pub fn tick(&self) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.running {
            return false;
        }
        let counter = state.counter;
        let channels = state.config.channels.len();
        let values = match state.config.mode {
            DataSourceMode::Manual => synthesize_values(
                &state.config,
                state.frequency,
                &state.phasors,
                &state.harmonics,
                counter,
            ),
            DataSourceMode::FilePlayback => state
                .source
                .as_mut()
                .and_then(|source| source.next_sample(channels))
                .unwrap_or_else(|| vec![0.0; channels]),
        };
        let samples = scale_values(&state.config, &values);
        encode_frame(&state.config, &samples, counter, &mut state.buffer);
        let result = self.sender.send_frame(&state.buffer);
        state.counter += 1;

        match result {
            Ok(_) => {
                if state.send_failing {
                    info!(stream = %self.id, counter, "frame transmission recovered");
                    state.send_failing = false;
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_sent(&self.id);
                }
            }
            Err(err) => {
                if state.send_failing {
                    debug!(stream = %self.id, counter, error = %err, "frame dropped");
                } else {
                    warn!(stream = %self.id, counter, error = %err, "frame transmission failed");
                    state.send_failing = true;
                }
                self.last_error.record(err.to_string());
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(&self.id);
                }
            }
        }
        true
    }

    pub fn status(&self) -> StreamStatus {
        let state = self.state.lock();
        StreamStatus {
            sv_id: self.id.clone(),
            running: state.running,
            sample_counter: state.counter,
            frequency: state.frequency,
            sample_rate: state.config.sample_rate,
            mode: state.config.mode,
            channels: state.config.channels.len(),
            phasors: state.phasors.clone(),
            last_error: self.last_error.get(),
        }
    }
}

fn check_frequency(frequency: f64) -> Result<(), ConfigError> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return Err(ConfigError::OutOfRange {
            field: "frequency",
            value: frequency.to_string(),
            reason: "must be positive and finite",
        });
    }
    Ok(())
}
