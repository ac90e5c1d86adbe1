//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Stream registry and per-stream real-time tick drivers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use r_prt_common::time::sample_period;
use r_prt_common::{
    CodecConfig, HarmonicSpec, LoopTimingReporter, PhasorSet, PhasorSink, SinkError,
};
use r_prt_metrics::CodecMetrics;
use r_prt_rt::{PeriodicTimer, RtConfig, TimerTick, WorkerHandle};
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::error::CodecError;
use crate::playback::WaveformSource;
use crate::stream::{StreamStatus, SvStream};
use crate::transport::RawFrameSender;

struct StreamEntry {
    stream: Arc<SvStream>,
    driver: Option<WorkerHandle>,
}

/// Registry of Sampled Value streams.
///
/// Structural operations serialize on one registry lock. Running streams tick on
/// their own driver threads and never take that lock.
pub struct StreamManager {
    streams: Mutex<IndexMap<String, StreamEntry>>,
    sender: Arc<dyn RawFrameSender>,
    metrics: Option<CodecMetrics>,
    codec: CodecConfig,
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("streams", &self.streams.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl StreamManager {
    pub fn new(
        codec: CodecConfig,
        sender: Arc<dyn RawFrameSender>,
        metrics: Option<CodecMetrics>,
    ) -> Self {
        Self {
            streams: Mutex::new(IndexMap::new()),
            sender,
            metrics,
            codec,
        }
    }

    pub fn codec_config(&self) -> &CodecConfig {
        &self.codec
    }

    pub fn create(&self, config: StreamConfig) -> Result<(), CodecError> {
        let mut streams = self.streams.lock();
        if streams.contains_key(&config.sv_id) {
            return Err(CodecError::DuplicateStream(config.sv_id));
        }
        let id = config.sv_id.clone();
        let stream = SvStream::new(config, self.sender.clone(), self.metrics.clone())?;
        streams.insert(
            id.clone(),
            StreamEntry {
                stream: Arc::new(stream),
                driver: None,
            },
        );
        info!(stream = %id, "stream created");
        Ok(())
    }

    pub fn update_config(&self, id: &str, config: StreamConfig) -> Result<(), CodecError> {
        let streams = self.streams.lock();
        let entry = lookup(&streams, id)?;
        entry.stream.update_config(config)
    }

    pub fn delete(&self, id: &str) -> Result<(), CodecError> {
        let mut streams = self.streams.lock();
        let mut entry = streams
            .shift_remove(id)
            .ok_or_else(|| CodecError::UnknownStream(id.to_owned()))?;
        halt(&mut entry);
        info!(stream = %id, "stream deleted");
        Ok(())
    }

    pub fn start(&self, id: &str) -> Result<(), CodecError> {
        let mut streams = self.streams.lock();
        let entry = streams
            .get_mut(id)
            .ok_or_else(|| CodecError::UnknownStream(id.to_owned()))?;
        if entry.stream.is_running() && entry.driver.is_some() {
            return Ok(());
        }
        entry.stream.start()?;
        match self.spawn_driver(entry.stream.clone()) {
            Ok(driver) => {
                entry.driver = Some(driver);
                Ok(())
            }
            Err(err) => {
                entry.stream.stop();
                Err(err)
            }
        }
    }

    /// Stop a stream and join its driver. Stopping a stopped stream is a no-op.
    pub fn stop(&self, id: &str) -> Result<(), CodecError> {
        let mut streams = self.streams.lock();
        let entry = streams
            .get_mut(id)
            .ok_or_else(|| CodecError::UnknownStream(id.to_owned()))?;
        halt(entry);
        Ok(())
    }

    pub fn stop_all(&self) {
        let mut streams = self.streams.lock();
        for entry in streams.values_mut() {
            halt(entry);
        }
    }

    pub fn set_phasors(&self, id: &str, phasors: PhasorSet) -> Result<(), CodecError> {
        self.stream(id)?.set_phasors(phasors)
    }

    pub fn set_harmonics(&self, id: &str, harmonics: HarmonicSpec) -> Result<(), CodecError> {
        self.stream(id)?.set_harmonics(harmonics)
    }

    pub fn set_frequency(&self, id: &str, frequency: f64) -> Result<(), CodecError> {
        self.stream(id)?.set_frequency(frequency)
    }

    pub fn set_source(&self, id: &str, source: Box<dyn WaveformSource>) -> Result<(), CodecError> {
        self.stream(id)?.set_source(source);
        Ok(())
    }

    pub fn status(&self, id: &str) -> Result<StreamStatus, CodecError> {
        Ok(self.stream(id)?.status())
    }

    pub fn list(&self) -> Vec<StreamStatus> {
        self.streams
            .lock()
            .values()
            .map(|entry| entry.stream.status())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.streams.lock().contains_key(id)
    }

    pub fn stream(&self, id: &str) -> Result<Arc<SvStream>, CodecError> {
        let streams = self.streams.lock();
        lookup(&streams, id).map(|entry| entry.stream.clone())
    }

    fn spawn_driver(&self, stream: Arc<SvStream>) -> Result<WorkerHandle, CodecError> {
        let period = sample_period(stream.config().sample_rate);
        let config = RtConfig::from_codec(format!("sv-{}", stream.id()), &self.codec);
        let handle = WorkerHandle::spawn(config, move |stop| {
            let mut timer = PeriodicTimer::new(period);
            let timing = LoopTimingReporter::new(period);
            while !stop.is_requested() {
                if let TimerTick::Overrun { late } = timer.wait() {
                    debug!(stream = %stream.id(), late_us = late.as_micros() as u64, "tick overrun");
                }
                if !stream.tick() {
                    break;
                }
                timing.record_tick();
            }
            if let Some(summary) = timing.histogram().summary() {
                info!(
                    stream = %stream.id(),
                    mean_jitter_ns = summary.mean_ns,
                    max_jitter_ns = summary.max_ns,
                    overruns = timer.overruns(),
                    "tick driver exited"
                );
            }
        })?;
        Ok(handle)
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl PhasorSink for StreamManager {
    fn apply(&self, stream_id: &str, frequency: f64, phasors: &PhasorSet) -> Result<(), SinkError> {
        let stream = self
            .stream(stream_id)
            .map_err(|_| SinkError::UnknownStream(stream_id.to_owned()))?;
        stream
            .apply(frequency, phasors.clone())
            .map_err(|err| SinkError::Rejected {
                stream: stream_id.to_owned(),
                reason: err.to_string(),
            })
    }
}

fn lookup<'a>(
    streams: &'a IndexMap<String, StreamEntry>,
    id: &str,
) -> Result<&'a StreamEntry, CodecError> {
    streams
        .get(id)
        .ok_or_else(|| CodecError::UnknownStream(id.to_owned()))
}

fn halt(entry: &mut StreamEntry) {
    entry.stream.stop();
    if let Some(driver) = entry.driver.take() {
        driver.stop();
    }
}
