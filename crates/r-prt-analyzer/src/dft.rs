//! ---
//! prt_section: "05-waveform-analysis"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "One-cycle discrete Fourier analysis: fundamental, harmonics, RMS and THD."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Spectral analysis of a one-cycle window.
//!
//! With a window of exactly one nominal cycle, bin `k` of an `N`-point transform is
//! the `k`-th harmonic. Bin magnitudes are converted to RMS (`√2·|X_k|/N`, with DC
//! and Nyquist at `|X_k|/N`) and angles are shifted by +90° so that
//! `√2·M·sin(ωt + φ)` reports angle `φ`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use r_prt_common::Phasor;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;
use statrs::statistics::Statistics;

/// Frequency reported when the window holds too few zero crossings.
pub const DEFAULT_FREQUENCY: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarmonicComponent {
    pub order: usize,
    /// RMS magnitude.
    pub magnitude: f64,
    pub angle_deg: f64,
    /// Magnitude relative to the fundamental, 0 when the fundamental is 0.
    pub percent_of_fundamental: f64,
}

/// Measurements of one channel over the latest one-cycle window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAnalysis {
    pub channel: String,
    pub fundamental: Phasor,
    /// Zero-crossing frequency estimate over the same window.
    pub frequency: f64,
    pub harmonics: Vec<HarmonicComponent>,
    pub total_rms: f64,
    pub thd_percent: f64,
    /// Largest absolute instantaneous value in the window.
    pub peak: f64,
}

/// Transform planner that caches one plan per window length.
pub struct DftEngine {
    planner: FftPlanner<f64>,
    plans: HashMap<usize, Arc<dyn Fft<f64>>>,
}

impl Default for DftEngine {
    fn default() -> Self {
        Self {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }
}

impl fmt::Debug for DftEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DftEngine")
            .field("cached_sizes", &self.plans.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DftEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward transform of a real window.
    pub fn transform(&mut self, window: &[f64]) -> Vec<Complex64> {
        let size = window.len();
        let mut buffer: Vec<Complex64> = window.iter().map(|v| Complex64::new(*v, 0.0)).collect();
        if size == 0 {
            return buffer;
        }
        let planner = &mut self.planner;
        let fft = self
            .plans
            .entry(size)
            .or_insert_with(|| planner.plan_fft_forward(size));
        fft.process(&mut buffer);
        buffer
    }

    /// Analyse a one-cycle window. Harmonic orders run from 2 to `max_harmonic`,
    /// bounded by the Nyquist bin of the window.
    pub fn analyze(
        &mut self,
        channel: &str,
        window: &[f64],
        sample_rate: f64,
        max_harmonic: usize,
    ) -> ChannelAnalysis {
        let n = window.len();
        let bins = self.transform(window);
        let nyquist = n / 2;

        let fundamental = match bin_rms(&bins, 1) {
            magnitude if n >= 2 && magnitude > f64::EPSILON => {
                Phasor::new(magnitude, bin_angle(bins[1]))
            }
            _ => Phasor::ZERO,
        };

        let harmonics: Vec<HarmonicComponent> = (2..=max_harmonic.min(nyquist))
            .map(|order| {
                let magnitude = bin_rms(&bins, order);
                HarmonicComponent {
                    order,
                    magnitude,
                    angle_deg: bin_angle(bins[order]),
                    percent_of_fundamental: ratio_percent(magnitude, fundamental.magnitude),
                }
            })
            .collect();

        let total_rms = (0..=nyquist.min(n.saturating_sub(1)))
            .map(|k| bin_rms(&bins, k).powi(2))
            .sum::<f64>()
            .sqrt();

        let harmonic_energy = harmonics.iter().map(|h| h.magnitude.powi(2)).sum::<f64>();
        let thd_percent = ratio_percent(harmonic_energy.sqrt(), fundamental.magnitude);

        let peak = if window.is_empty() {
            0.0
        } else {
            Statistics::max(window.iter())
                .abs()
                .max(Statistics::min(window.iter()).abs())
        };

        ChannelAnalysis {
            channel: channel.to_owned(),
            fundamental,
            frequency: zero_crossing_frequency(window, sample_rate),
            harmonics,
            total_rms,
            thd_percent,
            peak,
        }
    }
}

/// Frequency from sign changes: `cycles = crossings / 2` over the window duration.
///
/// Falls back to [`DEFAULT_FREQUENCY`] with fewer than three samples or two crossings.
pub fn zero_crossing_frequency(window: &[f64], sample_rate: f64) -> f64 {
    if window.len() < 3 || sample_rate <= 0.0 {
        return DEFAULT_FREQUENCY;
    }
    let crossings = window
        .windows(2)
        .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
        .count();
    if crossings < 2 {
        return DEFAULT_FREQUENCY;
    }
    let cycles = crossings as f64 / 2.0;
    cycles / (window.len() as f64 / sample_rate)
}

fn bin_rms(bins: &[Complex64], k: usize) -> f64 {
    let n = bins.len();
    if n == 0 || k >= n {
        return 0.0;
    }
    let scale = if k == 0 || (n % 2 == 0 && k == n / 2) {
        1.0
    } else {
        std::f64::consts::SQRT_2
    };
    scale * bins[k].norm() / n as f64
}

fn bin_angle(bin: Complex64) -> f64 {
    wrap_degrees(bin.arg().to_degrees() + 90.0)
}

fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole <= f64::EPSILON {
        0.0
    } else {
        100.0 * part / whole
    }
}

/// Wrap to (-180, 180].
fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}
