//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Phasor vocabulary shared by codec, orchestrator and testers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Phasor and harmonic state as seen by the Sampled Value codec.
//!
//! Magnitudes are RMS, angles are degrees referenced to a sine wave, so a phasor
//! `(M, φ)` corresponds to the instantaneous value `√2·M·sin(2πft + φ)`.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum number of analogue channels carried by one stream.
pub const MAX_CHANNELS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Phasor {
    pub magnitude: f64,
    pub angle_deg: f64,
}

impl Phasor {
    pub const ZERO: Phasor = Phasor {
        magnitude: 0.0,
        angle_deg: 0.0,
    };

    pub fn new(magnitude: f64, angle_deg: f64) -> Self {
        Self {
            magnitude,
            angle_deg,
        }
    }

    /// Build a phasor from rectangular components.
    pub fn from_rect(re: f64, im: f64) -> Self {
        Self {
            magnitude: re.hypot(im),
            angle_deg: im.atan2(re).to_degrees(),
        }
    }

    /// Rectangular `(re, im)` components.
    pub fn to_rect(&self) -> (f64, f64) {
        let theta = self.angle_deg.to_radians();
        (self.magnitude * theta.cos(), self.magnitude * theta.sin())
    }

    /// Instantaneous value at time `t` seconds for the given frequency.
    pub fn instantaneous(&self, frequency: f64, t: f64) -> f64 {
        std::f64::consts::SQRT_2
            * self.magnitude
            * (2.0 * std::f64::consts::PI * frequency * t + self.angle_deg.to_radians()).sin()
    }
}

/// Ordered per-channel phasors. Replaced as a whole, never patched in place by the codec.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhasorSet(Vec<Phasor>);

impl PhasorSet {
    pub fn new(phasors: Vec<Phasor>) -> Result<Self, ConfigError> {
        if phasors.len() > MAX_CHANNELS {
            return Err(ConfigError::OutOfRange {
                field: "phasor channel count",
                value: phasors.len().to_string(),
                reason: "at most 8 channels per stream",
            });
        }
        Ok(Self(phasors))
    }

    /// Full eight-channel set; cannot exceed the channel limit.
    pub fn from_channels(channels: [Phasor; MAX_CHANNELS]) -> Self {
        Self(channels.to_vec())
    }

    /// Balanced three-phase set in the default `Va Vb Vc Vn Ia Ib Ic In` layout.
    /// `current_lag_deg` is the angle by which currents lag their voltages.
    pub fn balanced(voltage: f64, current: f64, current_lag_deg: f64) -> Self {
        let v = |angle: f64| Phasor::new(voltage, angle);
        let i = |angle: f64| Phasor::new(current, angle - current_lag_deg);
        Self(vec![
            v(0.0),
            v(-120.0),
            v(120.0),
            Phasor::ZERO,
            i(0.0),
            i(-120.0),
            i(120.0),
            Phasor::ZERO,
        ])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, channel: usize) -> Option<&Phasor> {
        self.0.get(channel)
    }

    /// Phasor for `channel`, zero when the set does not reach that far.
    pub fn channel_or_zero(&self, channel: usize) -> Phasor {
        self.0.get(channel).copied().unwrap_or(Phasor::ZERO)
    }

    /// Return a copy with one channel replaced, growing the set with zero phasors if needed.
    pub fn with_channel(&self, channel: usize, phasor: Phasor) -> Result<Self, ConfigError> {
        if channel >= MAX_CHANNELS {
            return Err(ConfigError::OutOfRange {
                field: "channel index",
                value: channel.to_string(),
                reason: "at most 8 channels per stream",
            });
        }
        let mut phasors = self.0.clone();
        if phasors.len() <= channel {
            phasors.resize(channel + 1, Phasor::ZERO);
        }
        phasors[channel] = phasor;
        Ok(Self(phasors))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phasor> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Phasor] {
        &self.0
    }
}

/// One harmonic component, relative to the channel fundamental.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Harmonic {
    pub order: u32,
    /// Magnitude as a percentage of the fundamental RMS.
    pub magnitude_pct: f64,
    #[serde(default)]
    pub angle_deg: f64,
}

/// Per-channel harmonic content added on top of the fundamental phasors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarmonicSpec(Vec<Vec<Harmonic>>);

impl HarmonicSpec {
    pub fn new(channels: Vec<Vec<Harmonic>>) -> Result<Self, ConfigError> {
        if channels.len() > MAX_CHANNELS {
            return Err(ConfigError::OutOfRange {
                field: "harmonic channel count",
                value: channels.len().to_string(),
                reason: "at most 8 channels per stream",
            });
        }
        if let Some(bad) = channels.iter().flatten().find(|h| h.order < 2) {
            return Err(ConfigError::OutOfRange {
                field: "harmonic order",
                value: bad.order.to_string(),
                reason: "harmonic orders start at 2",
            });
        }
        Ok(Self(channels))
    }

    pub fn channel(&self, channel: usize) -> &[Harmonic] {
        self.0.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of channels with an entry, including empty ones.
    pub fn channel_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_more_than_eight_channels() {
        assert!(PhasorSet::new(vec![Phasor::ZERO; 9]).is_err());
        assert_eq!(PhasorSet::new(vec![Phasor::ZERO; 8]).unwrap().len(), 8);
    }

    #[test]
    fn balanced_set_uses_default_layout() {
        let set = PhasorSet::balanced(63.5, 1.0, 30.0);
        assert_eq!(set.len(), 8);
        assert_eq!(set.channel_or_zero(1).angle_deg, -120.0);
        assert_eq!(set.channel_or_zero(4).angle_deg, -30.0);
        assert_eq!(set.channel_or_zero(7).magnitude, 0.0);
    }

    #[test]
    fn with_channel_grows_set() {
        let set = PhasorSet::default()
            .with_channel(2, Phasor::new(5.0, 10.0))
            .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.channel_or_zero(0), Phasor::ZERO);
        assert!(PhasorSet::default().with_channel(8, Phasor::ZERO).is_err());
    }

    #[test]
    fn rect_round_trip_keeps_angle() {
        let phasor = Phasor::new(2.0, -45.0);
        let (re, im) = phasor.to_rect();
        let back = Phasor::from_rect(re, im);
        assert!((back.magnitude - 2.0).abs() < 1e-12);
        assert!((back.angle_deg + 45.0).abs() < 1e-9);
    }

    #[test]
    fn instantaneous_peaks_at_root_two() {
        let phasor = Phasor::new(10.0, 90.0);
        assert!((phasor.instantaneous(60.0, 0.0) - 10.0 * std::f64::consts::SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn harmonic_orders_start_at_two() {
        let bad = vec![vec![Harmonic {
            order: 1,
            magnitude_pct: 5.0,
            angle_deg: 0.0,
        }]];
        assert!(HarmonicSpec::new(bad).is_err());
        assert!(HarmonicSpec::default().channel(3).is_empty());
    }
}
