//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Test bench wiring streams, rules, sequencing, analysis and relay testers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use r_prt_analyzer::{
    AnalysisFrame, AnalysisSink, AnalyzerStatus, WaveformAnalyzer, WaveformFrame,
    WaveformSink,
};
use r_prt_codec::{
    CodecError, RawFrameReceiver, RawFrameSender, StreamConfig, StreamManager, StreamStatus,
};
use r_prt_common::{AppConfig, HarmonicSpec, PhasorSet, TestContext, TripSignal};
use r_prt_fault::{FaultSpec, PhasorState};
use r_prt_metrics::{encode_text, CodecMetrics, SequenceMetrics, SharedRegistry, TripMetrics};
use r_prt_sequence::{
    ProgressSink, Sequence, SequenceError, SequenceOrchestrator, SequenceProgress,
    SequenceSnapshot,
};
use r_prt_testers::{
    DifferentialSettings, DifferentialTest, DifferentialTester, DistanceSettings, DistanceTest,
    DistanceTester, OvercurrentSettings, OvercurrentTest, OvercurrentTester, RampTest,
    RampingTester, TesterIo,
};
use r_prt_trip::{
    DataValue, GooseDecoder, GooseIngestor, RuleError, RuleInfo, TripEvaluator, TripResult,
};
use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::monitor::{MonitorStats, SvMonitor};

/// Keeps only the most recent frame of each kind for polling hosts.
#[derive(Debug, Default)]
struct LatestFrames {
    waveform: Mutex<Option<WaveformFrame>>,
    analysis: Mutex<Option<AnalysisFrame>>,
    progress: Mutex<Option<SequenceProgress>>,
}

impl WaveformSink for LatestFrames {
    fn on_waveform(&self, frame: &WaveformFrame) {
        *self.waveform.lock() = Some(frame.clone());
    }
}

impl AnalysisSink for LatestFrames {
    fn on_analysis(&self, frame: &AnalysisFrame) {
        *self.analysis.lock() = Some(frame.clone());
    }
}

impl ProgressSink for LatestFrames {
    fn on_progress(&self, progress: &SequenceProgress) {
        *self.progress.lock() = Some(progress.clone());
    }
}

#[derive(Default)]
struct ReceivePaths {
    goose: Option<GooseIngestor>,
    monitor: Option<SvMonitor>,
}

/// One test bench: the in-process surface a request layer drives.
///
/// Every component shares the bench's [`TestContext`] trip signal.
pub struct TestBench {
    config: AppConfig,
    context: TestContext,
    streams: Arc<StreamManager>,
    evaluator: Arc<TripEvaluator>,
    sequencer: SequenceOrchestrator,
    analyzer: Arc<WaveformAnalyzer>,
    latest: Arc<LatestFrames>,
    receive: Mutex<ReceivePaths>,
    trip_metrics: Option<TripMetrics>,
    metrics_registry: Option<SharedRegistry>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for TestBench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestBench")
            .field("streams", &self.streams)
            .field("sequencer", &self.sequencer)
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl TestBench {
    /// Build every component from `config`, registering its streams and rules.
    pub fn new(
        config: BenchConfig,
        transport: Arc<dyn RawFrameSender>,
        metrics: Option<SharedRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let codec_metrics = match &metrics {
            Some(registry) => Some(CodecMetrics::new(registry.clone())?),
            None => None,
        };
        let trip_metrics = match &metrics {
            Some(registry) => Some(TripMetrics::new(registry.clone())?),
            None => None,
        };
        let sequence_metrics = match &metrics {
            Some(registry) => Some(SequenceMetrics::new(registry.clone())?),
            None => None,
        };

        let context = TestContext::new();
        let latest = Arc::new(LatestFrames::default());
        let streams = Arc::new(StreamManager::new(
            config.app.codec.clone(),
            transport,
            codec_metrics,
        ));
        for stream in &config.streams {
            streams
                .create(stream.clone())
                .with_context(|| format!("failed to create stream {}", stream.sv_id))?;
        }

        let evaluator = Arc::new(TripEvaluator::new(trip_metrics.clone()));
        for (name, expression) in &config.rules {
            evaluator
                .add_rule(name, expression)
                .with_context(|| format!("failed to add rule {name}"))?;
        }

        let sequencer = SequenceOrchestrator::new(
            streams.clone(),
            context.trip_signal(),
            config.app.sequence.clone(),
            Some(latest.clone() as Arc<dyn ProgressSink>),
            sequence_metrics,
        );
        let analyzer = Arc::new(WaveformAnalyzer::new(config.app.analyzer.clone()).with_sinks(
            Some(latest.clone() as Arc<dyn WaveformSink>),
            Some(latest.clone() as Arc<dyn AnalysisSink>),
        ));

        info!(
            streams = config.streams.len(),
            rules = config.rules.len(),
            metrics = metrics.is_some(),
            "test bench ready"
        );
        Ok(Self {
            config: config.app,
            context,
            streams,
            evaluator,
            sequencer,
            analyzer,
            latest,
            receive: Mutex::new(ReceivePaths::default()),
            trip_metrics,
            metrics_registry: metrics,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn trip_signal(&self) -> TripSignal {
        self.context.trip_signal()
    }

    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.streams
    }

    pub fn evaluator(&self) -> &Arc<TripEvaluator> {
        &self.evaluator
    }

    pub fn sequencer(&self) -> &SequenceOrchestrator {
        &self.sequencer
    }

    pub fn analyzer(&self) -> &Arc<WaveformAnalyzer> {
        &self.analyzer
    }

    // Streams.

    pub fn create_stream(&self, config: StreamConfig) -> Result<(), CodecError> {
        self.streams.create(config)
    }

    pub fn update_stream(&self, id: &str, config: StreamConfig) -> Result<(), CodecError> {
        self.streams.update_config(id, config)
    }

    pub fn delete_stream(&self, id: &str) -> Result<(), CodecError> {
        self.streams.delete(id)
    }

    pub fn start_stream(&self, id: &str) -> Result<(), CodecError> {
        self.streams.start(id)
    }

    pub fn stop_stream(&self, id: &str) -> Result<(), CodecError> {
        self.streams.stop(id)
    }

    pub fn set_phasors(&self, id: &str, phasors: PhasorSet) -> Result<(), CodecError> {
        self.streams.set_phasors(id, phasors)
    }

    pub fn set_harmonics(&self, id: &str, harmonics: HarmonicSpec) -> Result<(), CodecError> {
        self.streams.set_harmonics(id, harmonics)
    }

    pub fn set_frequency(&self, id: &str, frequency: f64) -> Result<(), CodecError> {
        self.streams.set_frequency(id, frequency)
    }

    pub fn stream_status(&self, id: &str) -> Result<StreamStatus, CodecError> {
        self.streams.status(id)
    }

    pub fn list_streams(&self) -> Vec<StreamStatus> {
        self.streams.list()
    }

    /// Compute `fault` and put the resulting phasors on stream `id`.
    pub fn apply_fault(&self, id: &str, fault: &FaultSpec) -> Result<PhasorState, CodecError> {
        let state = fault.calculate();
        self.streams.set_phasors(id, state.to_phasor_set())?;
        info!(stream = %id, fault = %fault.fault_type, "fault phasors applied");
        Ok(state)
    }

    // Sequences.

    pub fn start_sequence(&self, sequence: Sequence) -> Result<(), SequenceError> {
        self.sequencer.start(sequence)
    }

    pub fn pause_sequence(&self) -> bool {
        self.sequencer.pause()
    }

    pub fn resume_sequence(&self) -> bool {
        self.sequencer.resume()
    }

    pub fn stop_sequence(&self) -> bool {
        self.sequencer.stop()
    }

    pub fn sequence_snapshot(&self) -> SequenceSnapshot {
        self.sequencer.snapshot()
    }

    /// Most recent progress event of the current or last run.
    pub fn latest_progress(&self) -> Option<SequenceProgress> {
        self.latest.progress.lock().clone()
    }

    // Trip rules.

    pub fn add_rule(&self, name: &str, expression: &str) -> Result<(), RuleError> {
        self.evaluator.add_rule(name, expression)
    }

    pub fn remove_rule(&self, name: &str) -> Result<(), RuleError> {
        self.evaluator.remove_rule(name)
    }

    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> Result<(), RuleError> {
        self.evaluator.set_enabled(name, enabled)
    }

    pub fn list_rules(&self) -> Vec<RuleInfo> {
        self.evaluator.list_rules()
    }

    pub fn update_data_point(&self, path: &str, value: DataValue) {
        self.evaluator.update_data_point(path, value);
    }

    /// Evaluate the rule table and raise the shared trip signal on a hit.
    pub fn evaluate_and_signal(&self) -> TripResult {
        let result = self.evaluator.evaluate();
        if result.triggered {
            self.context.trip_signal().set();
        }
        result
    }

    // Analyzer.

    /// Point the analyzer at stream `id`, restarting it with that stream's sample rate.
    pub fn select_analyzer_stream(&self, id: &str) -> Result<()> {
        let sample_rate = self.streams.stream(id)?.config().sample_rate;
        self.analyzer.stop();
        *self.latest.analysis.lock() = None;
        *self.latest.waveform.lock() = None;
        self.analyzer
            .start(id, f64::from(sample_rate))
            .with_context(|| format!("failed to analyze stream {id}"))
    }

    pub fn stop_analyzer(&self) -> bool {
        self.analyzer.stop()
    }

    pub fn analyzer_status(&self) -> AnalyzerStatus {
        self.analyzer.status()
    }

    pub fn latest_analysis(&self) -> Option<AnalysisFrame> {
        self.latest.analysis.lock().clone()
    }

    pub fn latest_waveform(&self) -> Option<WaveformFrame> {
        self.latest.waveform.lock().clone()
    }

    // Relay testers.

    fn tester_io(&self, stream_id: &str) -> Result<TesterIo> {
        let frequency = self.streams.stream(stream_id)?.config().nominal_frequency;
        Ok(TesterIo::new(
            self.streams.clone(),
            self.context.trip_signal(),
            stream_id,
            frequency,
            &self.config.testers,
        ))
    }

    pub fn ramping_tester(&self, stream_id: &str) -> Result<RampingTester> {
        Ok(RampingTester::new(RampTest::new(self.tester_io(stream_id)?)))
    }

    pub fn overcurrent_tester(
        &self,
        stream_id: &str,
        settings: OvercurrentSettings,
    ) -> Result<OvercurrentTester> {
        let test = OvercurrentTest::new(self.tester_io(stream_id)?, settings)?;
        Ok(OvercurrentTester::new(test))
    }

    pub fn distance_tester(
        &self,
        stream_id: &str,
        settings: DistanceSettings,
    ) -> Result<DistanceTester> {
        let test = DistanceTest::new(self.tester_io(stream_id)?, settings)?;
        Ok(DistanceTester::new(test))
    }

    /// Side 1 goes to `stream_id`, side 2 to `side2_stream`; both must exist.
    pub fn differential_tester(
        &self,
        stream_id: &str,
        side2_stream: &str,
        settings: DifferentialSettings,
    ) -> Result<DifferentialTester> {
        if !self.streams.contains(side2_stream) {
            return Err(CodecError::UnknownStream(side2_stream.to_owned()).into());
        }
        let test = DifferentialTest::new(self.tester_io(stream_id)?, side2_stream, settings)?;
        Ok(DifferentialTester::new(test))
    }

    // Receive paths.

    /// Start GOOSE ingestion into the evaluator, replacing a running ingestor.
    pub fn spawn_goose_ingestor(
        &self,
        receiver: Arc<dyn RawFrameReceiver>,
        decoder: Arc<dyn GooseDecoder>,
    ) -> Result<()> {
        let mut receive = self.receive.lock();
        if let Some(previous) = receive.goose.take() {
            previous.stop();
        }
        let ingestor = GooseIngestor::spawn(
            receiver,
            decoder,
            self.evaluator.clone(),
            self.context.trip_signal(),
            &self.config.goose,
            self.trip_metrics.clone(),
        )
        .context("failed to start GOOSE ingestion")?;
        receive.goose = Some(ingestor);
        Ok(())
    }

    /// Start feeding received Sampled Values into the analyzer, replacing a running monitor.
    pub fn spawn_sv_monitor(&self, receiver: Arc<dyn RawFrameReceiver>) -> Result<()> {
        let mut receive = self.receive.lock();
        if let Some(previous) = receive.monitor.take() {
            previous.stop();
        }
        let monitor = SvMonitor::spawn(
            receiver,
            self.streams.clone(),
            self.analyzer.clone(),
            self.config.goose.receive_timeout,
        )
        .context("failed to start SV monitor")?;
        receive.monitor = Some(monitor);
        Ok(())
    }

    pub fn monitor_stats(&self) -> Option<MonitorStats> {
        self.receive.lock().monitor.as_ref().map(SvMonitor::stats)
    }

    pub fn goose_last_error(&self) -> Option<String> {
        self.receive.lock().goose.as_ref().and_then(GooseIngestor::last_error)
    }

    /// Prometheus text exposition of every bench counter.
    pub fn metrics_text(&self) -> Result<String> {
        let registry = self
            .metrics_registry
            .as_ref()
            .ok_or_else(|| anyhow!("metrics are disabled for this bench"))?;
        encode_text(registry)
    }

    /// Stop the receive paths, the sequence, the analyzer and every stream. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut receive = self.receive.lock();
            if let Some(goose) = receive.goose.take() {
                goose.stop();
            }
            if let Some(monitor) = receive.monitor.take() {
                monitor.stop();
            }
        }
        if self.sequencer.stop() {
            warn!("sequence stopped by bench shutdown");
        }
        self.analyzer.stop();
        self.streams.stop_all();
        info!("test bench shut down");
    }
}

impl Drop for TestBench {
    fn drop(&mut self) {
        self.shutdown();
    }
}
