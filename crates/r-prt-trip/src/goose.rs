//! ---
//! prt_section: "03-trip-evaluation"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "GOOSE receive loop feeding data points into the trip evaluator."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::Arc;

use r_prt_codec::RawFrameReceiver;
use r_prt_common::{GooseConfig, LastError, TripSignal};
use r_prt_metrics::TripMetrics;
use r_prt_rt::{RtConfig, RtError, StopFlag, WorkerHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ast::DataValue;
use crate::error::DecodeError;
use crate::evaluator::TripEvaluator;

/// One data point carried by a GOOSE dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GooseUpdate {
    pub path: String,
    pub value: DataValue,
}

impl GooseUpdate {
    pub fn new(path: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Turns a received frame into data point updates.
pub trait GooseDecoder: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Result<Vec<GooseUpdate>, DecodeError>;
}

/// Decoder for frames whose payload is a JSON array of `{ "path", "value" }`
/// objects. Used by loopback benches and tests in place of a BER decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonUpdateDecoder;

impl JsonUpdateDecoder {
    pub fn encode(updates: &[GooseUpdate]) -> Vec<u8> {
        serde_json::to_vec(updates).unwrap_or_default()
    }
}

impl GooseDecoder for JsonUpdateDecoder {
    fn decode(&self, frame: &[u8]) -> Result<Vec<GooseUpdate>, DecodeError> {
        serde_json::from_slice(frame).map_err(|err| DecodeError(err.to_string()))
    }
}

/// Background receive loop: frame → decode → upsert → evaluate → trip signal.
///
/// Receive and decode failures are logged and counted but never stop the loop.
pub struct GooseIngestor {
    worker: WorkerHandle,
    last_error: Arc<LastError>,
}

impl std::fmt::Debug for GooseIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GooseIngestor")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl GooseIngestor {
    pub fn spawn(
        receiver: Arc<dyn RawFrameReceiver>,
        decoder: Arc<dyn GooseDecoder>,
        evaluator: Arc<TripEvaluator>,
        trip: TripSignal,
        config: &GooseConfig,
        metrics: Option<TripMetrics>,
    ) -> Result<Self, RtError> {
        let last_error = Arc::new(LastError::default());
        let loop_state = IngestLoop {
            receiver,
            decoder,
            evaluator,
            trip,
            timeout: config.receive_timeout,
            metrics,
            last_error: Arc::clone(&last_error),
        };
        let worker = WorkerHandle::spawn(RtConfig::new("goose-ingest"), move |stop| {
            loop_state.run(stop)
        })?;
        info!(timeout_ms = config.receive_timeout.as_millis() as u64, "GOOSE ingestion started");
        Ok(Self { worker, last_error })
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop and join the receive loop. Idempotent.
    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

struct IngestLoop {
    receiver: Arc<dyn RawFrameReceiver>,
    decoder: Arc<dyn GooseDecoder>,
    evaluator: Arc<TripEvaluator>,
    trip: TripSignal,
    timeout: std::time::Duration,
    metrics: Option<TripMetrics>,
    last_error: Arc<LastError>,
}

impl IngestLoop {
    fn run(&self, stop: StopFlag) {
        while !stop.is_requested() {
            match self.receiver.receive_frame(self.timeout) {
                Ok(Some(frame)) => self.handle_frame(&frame),
                Ok(None) => {}
                Err(err) => {
                    self.count("receive_error");
                    debug!(error = %err, "GOOSE receive failed");
                    self.last_error.record(err.to_string());
                    stop.sleep(self.timeout, self.timeout);
                }
            }
        }
        debug!("GOOSE ingestion loop exited");
    }

    fn handle_frame(&self, frame: &[u8]) {
        let updates = match self.decoder.decode(frame) {
            Ok(updates) => updates,
            Err(err) => {
                self.count("decode_error");
                warn!(error = %err, len = frame.len(), "dropping undecodable GOOSE frame");
                self.last_error.record(err.to_string());
                return;
            }
        };
        self.count("decoded");
        for update in updates {
            self.evaluator.update_data_point(&update.path, update.value);
        }
        let result = self.evaluator.evaluate();
        if result.triggered {
            self.trip.set();
            info!(rule = ?result.rule_name, "trip signal raised");
        }
    }

    fn count(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_goose_frame(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_decoder_reads_typed_values() {
        let frame = br#"[{"path":"a","value":true},{"path":"b","value":3},{"path":"c","value":0.5}]"#;
        let updates = JsonUpdateDecoder.decode(frame).unwrap();
        assert_eq!(
            updates,
            vec![
                GooseUpdate::new("a", true),
                GooseUpdate::new("b", 3i64),
                GooseUpdate::new("c", 0.5),
            ]
        );
        assert!(JsonUpdateDecoder.decode(b"\x01\x02").is_err());
    }

    #[test]
    fn encode_is_inverse_of_decode() {
        let updates = vec![GooseUpdate::new("IED1/PTRC1.Tr.general", true)];
        let frame = JsonUpdateDecoder::encode(&updates);
        assert_eq!(JsonUpdateDecoder.decode(&frame).unwrap(), updates);
    }
}
