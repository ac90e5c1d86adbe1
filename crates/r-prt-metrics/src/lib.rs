//! ---
//! prt_section: "03-persistence-logging"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Metrics collection utilities."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Counter families published by the bench components.
//!
//! Transient I/O failures are absorbed at the component boundary; these counters are
//! where they become visible. Exporting the registry is left to the host process.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Shared registry type used across components.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render the registry in the Prometheus text exposition format.
pub fn encode_text(registry: &SharedRegistry) -> Result<String> {
    let families = registry.gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .map_err(|err| {
            error!(error = %err, "failed to encode metrics");
            err
        })
        .context("metrics encoding error")
}

fn register_counter_vec(
    registry: &SharedRegistry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry
        .register(Box::new(counter.clone()))
        .with_context(|| format!("failed to register {}", name))?;
    Ok(counter)
}

/// Frame counters for Sampled Value streams.
#[derive(Clone)]
pub struct CodecMetrics {
    registry: SharedRegistry,
    frames_sent: IntCounterVec,
    send_failures: IntCounterVec,
}

impl CodecMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let frames_sent = register_counter_vec(
            &registry,
            "r_prt_sv_frames_sent_total",
            "Sampled Value frames handed to the raw frame transport",
            &["stream"],
        )?;
        let send_failures = register_counter_vec(
            &registry,
            "r_prt_sv_send_failures_total",
            "Sampled Value frames the transport refused",
            &["stream"],
        )?;
        Ok(Self {
            registry,
            frames_sent,
            send_failures,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_sent(&self, stream: &str) {
        self.frames_sent.with_label_values(&[stream]).inc();
    }

    pub fn record_failure(&self, stream: &str) {
        self.send_failures.with_label_values(&[stream]).inc();
    }

    pub fn sent(&self, stream: &str) -> u64 {
        self.frames_sent.with_label_values(&[stream]).get()
    }

    pub fn failures(&self, stream: &str) -> u64 {
        self.send_failures.with_label_values(&[stream]).get()
    }
}

impl fmt::Debug for CodecMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecMetrics").finish_non_exhaustive()
    }
}

/// Trip rule evaluation counters.
#[derive(Clone)]
pub struct TripMetrics {
    evaluations: IntCounterVec,
    trips: IntCounterVec,
    parse_failures: IntCounterVec,
    goose_frames: IntCounterVec,
}

impl TripMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        Ok(Self {
            evaluations: register_counter_vec(
                &registry,
                "r_prt_trip_evaluations_total",
                "Trip rule table evaluations by outcome",
                &["outcome"],
            )?,
            trips: register_counter_vec(
                &registry,
                "r_prt_trip_rule_hits_total",
                "Evaluations in which the named rule triggered",
                &["rule"],
            )?,
            parse_failures: register_counter_vec(
                &registry,
                "r_prt_trip_rule_parse_failures_total",
                "Rejected rule definitions",
                &["rule"],
            )?,
            goose_frames: register_counter_vec(
                &registry,
                "r_prt_goose_frames_total",
                "GOOSE frames received by outcome",
                &["outcome"],
            )?,
        })
    }

    pub fn record_evaluation(&self, triggered_rule: Option<&str>) {
        match triggered_rule {
            Some(rule) => {
                self.evaluations.with_label_values(&["triggered"]).inc();
                self.trips.with_label_values(&[rule]).inc();
            }
            None => self.evaluations.with_label_values(&["clear"]).inc(),
        }
    }

    pub fn record_parse_failure(&self, rule: &str) {
        self.parse_failures.with_label_values(&[rule]).inc();
    }

    pub fn record_goose_frame(&self, outcome: &str) {
        self.goose_frames.with_label_values(&[outcome]).inc();
    }

    pub fn rule_hits(&self, rule: &str) -> u64 {
        self.trips.with_label_values(&[rule]).get()
    }
}

impl fmt::Debug for TripMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripMetrics").finish_non_exhaustive()
    }
}

/// Sequence execution counters.
#[derive(Clone)]
pub struct SequenceMetrics {
    state_entries: IntCounterVec,
    outcomes: IntCounterVec,
}

impl SequenceMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        Ok(Self {
            state_entries: register_counter_vec(
                &registry,
                "r_prt_sequence_state_entries_total",
                "Sequence states entered, by transition kind",
                &["transition"],
            )?,
            outcomes: register_counter_vec(
                &registry,
                "r_prt_sequence_outcomes_total",
                "Terminal sequence outcomes",
                &["status"],
            )?,
        })
    }

    pub fn record_state_entry(&self, transition: &str) {
        self.state_entries.with_label_values(&[transition]).inc();
    }

    pub fn record_outcome(&self, status: &str) {
        self.outcomes.with_label_values(&[status]).inc();
    }

    pub fn outcomes(&self, status: &str) -> u64 {
        self.outcomes.with_label_values(&[status]).get()
    }
}

impl fmt::Debug for SequenceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceMetrics").finish_non_exhaustive()
    }
}

pub use prometheus;
