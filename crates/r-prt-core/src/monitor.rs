//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Receive path decoding Sampled Value frames into analyzer samples."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use r_prt_analyzer::WaveformAnalyzer;
use r_prt_codec::{decode_frame, FrameDecodeError, RawFrameReceiver, StreamManager};
use r_prt_common::LastError;
use r_prt_rt::{RtConfig, RtError, StopFlag, WorkerHandle};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Frame counters of one monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Frames decoded and handed to the analyzer.
    pub decoded: u64,
    /// Frames that were not Sampled Values or belong to no registered stream.
    pub ignored: u64,
    /// Malformed Sampled Value frames and receive failures.
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    decoded: AtomicU64,
    ignored: AtomicU64,
    errors: AtomicU64,
}

/// Background loop: frame → decode → scale with the stream's config → analyzer.
///
/// The analyzer itself filters on its selected stream, so the monitor forwards
/// every registered stream it sees.
pub struct SvMonitor {
    worker: WorkerHandle,
    counters: Arc<Counters>,
    last_error: Arc<LastError>,
}

impl std::fmt::Debug for SvMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvMonitor")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SvMonitor {
    pub fn spawn(
        receiver: Arc<dyn RawFrameReceiver>,
        streams: Arc<StreamManager>,
        analyzer: Arc<WaveformAnalyzer>,
        receive_timeout: Duration,
    ) -> Result<Self, RtError> {
        let counters = Arc::new(Counters::default());
        let last_error = Arc::new(LastError::default());
        let monitor = MonitorLoop {
            receiver,
            streams,
            analyzer,
            timeout: receive_timeout,
            counters: Arc::clone(&counters),
            last_error: Arc::clone(&last_error),
        };
        let worker = WorkerHandle::spawn(RtConfig::new("sv-monitor"), move |stop| monitor.run(stop))?;
        info!("SV monitor started");
        Ok(Self {
            worker,
            counters,
            last_error,
        })
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop and join the receive loop. Idempotent.
    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

struct MonitorLoop {
    receiver: Arc<dyn RawFrameReceiver>,
    streams: Arc<StreamManager>,
    analyzer: Arc<WaveformAnalyzer>,
    timeout: Duration,
    counters: Arc<Counters>,
    last_error: Arc<LastError>,
}

impl MonitorLoop {
    fn run(&self, stop: StopFlag) {
        let started = Instant::now();
        while !stop.is_requested() {
            match self.receiver.receive_frame(self.timeout) {
                Ok(Some(frame)) => self.handle_frame(&frame, started.elapsed().as_secs_f64()),
                Ok(None) => {}
                Err(err) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %err, "SV receive failed");
                    self.last_error.record(err.to_string());
                    stop.sleep(self.timeout, self.timeout);
                }
            }
        }
        debug!("SV monitor loop exited");
    }

    fn handle_frame(&self, frame: &[u8], timestamp: f64) {
        let decoded = match decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(FrameDecodeError::NotSampledValues { ethertype }) => {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(ethertype, "ignoring non-SV frame");
                return;
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, len = frame.len(), "dropping malformed SV frame");
                self.last_error.record(err.to_string());
                return;
            }
        };
        let Ok(stream) = self.streams.stream(&decoded.sv_id) else {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(sv_id = %decoded.sv_id, "frame for unregistered stream");
            return;
        };
        let config = stream.config();
        let values = decoded.scaled_values(&config);
        self.analyzer.process_samples(
            &decoded.sv_id,
            config
                .channels
                .iter()
                .map(|channel| channel.name.as_str())
                .zip(values),
            timestamp,
        );
        self.counters.decoded.fetch_add(1, Ordering::Relaxed);
    }
}
