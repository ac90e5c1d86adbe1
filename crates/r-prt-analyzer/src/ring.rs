//! ---
//! prt_section: "05-waveform-analysis"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Fixed-capacity per-channel sample ring."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::collections::VecDeque;

/// Timestamped samples of one channel. Pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct SampleRing {
    capacity: usize,
    samples: VecDeque<(f64, f64)>,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f64, timestamp: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((value, timestamp));
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Most recent `count` values, oldest first, or `None` when fewer are buffered.
    pub fn latest(&self, count: usize) -> Option<Vec<f64>> {
        if count == 0 || self.samples.len() < count {
            return None;
        }
        let skip = self.samples.len() - count;
        Some(self.samples.iter().skip(skip).map(|(v, _)| *v).collect())
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|(v, _)| *v).collect()
    }

    /// Timestamps relative to the oldest buffered sample.
    pub fn relative_timestamps(&self) -> Vec<f64> {
        let origin = self.samples.front().map(|(_, t)| *t).unwrap_or(0.0);
        self.samples.iter().map(|(_, t)| t - origin).collect()
    }
}
