//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Dual-slope differential characteristic tests over two streams."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Differential tests.
//!
//! A point is given as a (bias, differential) pair and converted into two
//! opposing three-phase currents, one per protected side, each side on its own
//! stream. With `I1 = Ibias + Idiff/2` entering and `I2 = Ibias − Idiff/2`
//! leaving, `|I1 + I2| = Idiff` and `(|I1| + |I2|)/2 = Ibias`.

use std::time::Duration;

use r_prt_common::PhasorSet;
use r_prt_sequence::WaitControl;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::info;

use crate::error::TesterError;
use crate::io::TesterIo;
use crate::runtime::{Expectation, RelayTest, Tester};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialSettings {
    /// Minimum operating current.
    pub pickup_amps: f64,
    /// First slope in percent, up to the breakpoint.
    pub slope1_pct: f64,
    /// Second slope in percent, above the breakpoint.
    pub slope2_pct: f64,
    /// Bias current where the second slope starts.
    pub breakpoint_amps: f64,
    /// Phase voltage held on both sides, RMS.
    #[serde(default)]
    pub voltage: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl DifferentialSettings {
    /// Differential current needed to operate at `bias_amps`.
    pub fn operate_threshold(&self, bias_amps: f64) -> f64 {
        let slope1 = self.slope1_pct / 100.0;
        let slope2 = self.slope2_pct / 100.0;
        let restraint = if bias_amps <= self.breakpoint_amps {
            slope1 * bias_amps
        } else {
            slope1 * self.breakpoint_amps + slope2 * (bias_amps - self.breakpoint_amps)
        };
        restraint.max(self.pickup_amps)
    }

    pub fn operates(&self, bias_amps: f64, differential_amps: f64) -> bool {
        differential_amps >= self.operate_threshold(bias_amps)
    }

    fn validate(&self) -> Result<(), TesterError> {
        if !(self.pickup_amps > 0.0) {
            return Err(TesterError::InvalidSettings("pickup must be positive".into()));
        }
        if self.slope1_pct < 0.0 || self.slope2_pct < self.slope1_pct {
            return Err(TesterError::InvalidSettings(format!(
                "slopes {}% / {}% must be non-negative and rising",
                self.slope1_pct, self.slope2_pct
            )));
        }
        if self.breakpoint_amps < 0.0 || self.timeout.is_zero() {
            return Err(TesterError::InvalidSettings(
                "breakpoint must not be negative and timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifferentialPoint {
    pub bias_amps: f64,
    pub differential_amps: f64,
    /// Overrides the outcome derived from the characteristic.
    #[serde(default)]
    pub expectation: Option<Expectation>,
}

impl DifferentialPoint {
    pub fn new(bias_amps: f64, differential_amps: f64) -> Self {
        Self {
            bias_amps,
            differential_amps,
            expectation: None,
        }
    }

    /// Side currents `(entering, leaving)`.
    pub fn side_currents(&self) -> (f64, f64) {
        let half = self.differential_amps / 2.0;
        (self.bias_amps + half, self.bias_amps - half)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialOutcome {
    pub bias_amps: f64,
    pub differential_amps: f64,
    pub side1_amps: f64,
    pub side2_amps: f64,
    pub expected: Expectation,
    pub tripped: bool,
    pub trip_secs: Option<f64>,
    pub passed: bool,
}

#[derive(Debug)]
pub struct DifferentialTest {
    io: TesterIo,
    side2_stream: String,
    settings: DifferentialSettings,
}

impl DifferentialTest {
    /// `io` drives side 1; side 2 is written to `side2_stream` through the same sink.
    pub fn new(
        io: TesterIo,
        side2_stream: impl Into<String>,
        settings: DifferentialSettings,
    ) -> Result<Self, TesterError> {
        settings.validate()?;
        Ok(Self {
            io,
            side2_stream: side2_stream.into(),
            settings,
        })
    }

    pub fn settings(&self) -> &DifferentialSettings {
        &self.settings
    }

    fn apply_sides(&self, side1: f64, side2: f64) -> Result<(), TesterError> {
        let voltage = self.settings.voltage;
        self.io.apply(&PhasorSet::balanced(voltage, side1, 0.0))?;
        self.io.apply_to(
            &self.side2_stream,
            self.io.frequency(),
            &PhasorSet::balanced(voltage, side2, 180.0),
        )
    }
}

impl RelayTest for DifferentialTest {
    type Point = DifferentialPoint;
    type Outcome = DifferentialOutcome;

    fn kind(&self) -> &'static str {
        "differential"
    }

    fn io(&self) -> &TesterIo {
        &self.io
    }

    fn validate(&self, point: &DifferentialPoint) -> Result<(), TesterError> {
        if !(point.bias_amps >= 0.0 && point.differential_amps >= 0.0) {
            return Err(TesterError::InvalidPoint(
                "bias and differential must be non-negative".into(),
            ));
        }
        if point.differential_amps > 2.0 * point.bias_amps {
            return Err(TesterError::InvalidPoint(format!(
                "differential {} A exceeds twice the bias {} A",
                point.differential_amps, point.bias_amps
            )));
        }
        Ok(())
    }

    fn execute(
        &self,
        point: &DifferentialPoint,
        control: &WaitControl,
    ) -> Result<DifferentialOutcome, TesterError> {
        let (side1, side2) = point.side_currents();
        let expected = point.expectation.unwrap_or_else(|| {
            Expectation::from_trip(self.settings.operates(point.bias_amps, point.differential_amps))
        });

        self.io.arm();
        self.apply_sides(side1, side2)?;
        let trip = self.io.await_trip(self.settings.timeout, control);
        self.apply_sides(0.0, 0.0)?;
        let trip = trip?;

        let passed = expected.expects_trip() == trip.is_some();
        info!(
            bias = point.bias_amps,
            differential = point.differential_amps,
            expected = %expected,
            tripped = trip.is_some(),
            passed,
            "differential point finished"
        );
        Ok(DifferentialOutcome {
            bias_amps: point.bias_amps,
            differential_amps: point.differential_amps,
            side1_amps: side1,
            side2_amps: side2,
            expected,
            tripped: trip.is_some(),
            trip_secs: trip.map(|d| d.as_secs_f64()),
            passed,
        })
    }
}

pub type DifferentialTester = Tester<DifferentialTest>;

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DifferentialSettings {
        DifferentialSettings {
            pickup_amps: 0.3,
            slope1_pct: 25.0,
            slope2_pct: 50.0,
            breakpoint_amps: 2.0,
            voltage: 63.5,
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn characteristic_has_three_regions() {
        let s = settings();
        assert!((s.operate_threshold(0.5) - 0.3).abs() < 1e-12);
        assert!((s.operate_threshold(1.6) - 0.4).abs() < 1e-12);
        assert!((s.operate_threshold(4.0) - 1.5).abs() < 1e-12);
        assert!(s.operates(4.0, 1.6));
        assert!(!s.operates(4.0, 1.4));
    }

    #[test]
    fn side_currents_reproduce_bias_and_differential() {
        let point = DifferentialPoint::new(2.0, 1.0);
        let (i1, i2) = point.side_currents();
        assert_eq!((i1, i2), (2.5, 1.5));
        assert!(((i1 + i2) / 2.0 - 2.0).abs() < 1e-12);
        assert!((i1 - i2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn falling_slopes_are_rejected() {
        let mut s = settings();
        s.slope2_pct = 10.0;
        assert!(matches!(s.validate(), Err(TesterError::InvalidSettings(_))));
    }
}
