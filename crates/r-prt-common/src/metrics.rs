//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Tick jitter histogram and loop timing reporter for the codec tick drivers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Bounded jitter sample store. Oldest samples are dropped once `capacity` is reached.
#[derive(Debug)]
pub struct JitterHistogram {
    samples: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl Default for JitterHistogram {
    fn default() -> Self {
        Self::with_capacity(65_536)
    }
}

impl JitterHistogram {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, jitter: Duration) {
        let nanos = jitter.as_secs_f64() * 1_000_000_000.0;
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    pub fn summary(&self) -> Option<JitterSummary> {
        let mut samples = self.samples.lock();
        let slice: &[f64] = samples.make_contiguous();
        if slice.is_empty() {
            return None;
        }
        let std_dev = if slice.len() > 1 {
            Statistics::std_dev(slice.iter())
        } else {
            0.0
        };
        Some(JitterSummary {
            mean_ns: Statistics::mean(slice.iter()),
            std_dev_ns: std_dev,
            max_ns: Statistics::max(slice.iter()),
            min_ns: Statistics::min(slice.iter()),
            samples: slice.len() as u64,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JitterSummary {
    pub mean_ns: f64,
    pub std_dev_ns: f64,
    pub max_ns: f64,
    pub min_ns: f64,
    pub samples: u64,
}

/// Helper for measuring tick intervals against a target period.
#[derive(Debug)]
pub struct LoopTimingReporter {
    target_interval: Duration,
    last_tick: Mutex<Option<Instant>>,
    histogram: JitterHistogram,
}

impl LoopTimingReporter {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            last_tick: Mutex::new(None),
            histogram: JitterHistogram::default(),
        }
    }

    pub fn record_tick(&self) {
        self.record_tick_at(Instant::now());
    }

    pub fn record_tick_at(&self, now: Instant) {
        let mut last_tick = self.last_tick.lock();
        if let Some(previous) = *last_tick {
            let actual = now.duration_since(previous);
            let jitter = if actual > self.target_interval {
                actual - self.target_interval
            } else {
                self.target_interval - actual
            };
            self.histogram.record(jitter);
        }
        *last_tick = Some(now);
    }

    pub fn histogram(&self) -> &JitterHistogram {
        &self.histogram
    }
}
