//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Pickup search by stepping magnitude, angle or frequency."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::time::Duration;

use r_prt_common::{Phasor, PhasorSet, MAX_CHANNELS};
use r_prt_sequence::WaitControl;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::error::TesterError;
use crate::io::TesterIo;
use crate::runtime::{RelayTest, Tester};

/// Quantity stepped by a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RampQuantity {
    /// Absolute RMS magnitude of the ramped channels.
    Magnitude,
    /// Offset in degrees added to the base angle of the ramped channels.
    Angle,
    /// Stream frequency in Hz; channels are ignored.
    Frequency,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampPoint {
    /// Phasors held while ramping; ramped channels are overridden.
    pub base: PhasorSet,
    #[serde(default)]
    pub channels: Vec<usize>,
    pub quantity: RampQuantity,
    pub start: f64,
    pub end: f64,
    /// Step size, always positive; the direction follows `start` and `end`.
    pub step: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub step_duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampOutcome {
    pub quantity: RampQuantity,
    pub tripped: bool,
    /// Ramp value applied when the trip was seen.
    pub pickup: Option<f64>,
    /// Time from the pickup step to the trip.
    pub trip_secs: Option<f64>,
    pub steps_applied: usize,
    pub last_value: f64,
}

/// Values visited from `start` to `end` inclusive. The last step is shortened so
/// the ramp always ends exactly on `end`.
pub fn ramp_values(start: f64, end: f64, step: f64) -> Vec<f64> {
    let span = end - start;
    let direction = if span < 0.0 { -1.0 } else { 1.0 };
    let whole_steps = (span.abs() / step + 1e-9).floor() as usize;
    let mut values: Vec<f64> = (0..=whole_steps)
        .map(|k| start + direction * k as f64 * step)
        .collect();
    if values.last().map_or(true, |last| (last - end).abs() > 1e-9) {
        values.push(end);
    }
    values
}

#[derive(Debug)]
pub struct RampTest {
    io: TesterIo,
}

impl RampTest {
    pub fn new(io: TesterIo) -> Self {
        Self { io }
    }

    fn output(&self, point: &RampPoint, value: f64) -> Result<(f64, PhasorSet), TesterError> {
        let mut phasors = point.base.clone();
        match point.quantity {
            RampQuantity::Frequency => return Ok((value, phasors)),
            RampQuantity::Magnitude => {
                for &channel in &point.channels {
                    let angle = point.base.channel_or_zero(channel).angle_deg;
                    phasors = phasors.with_channel(channel, Phasor::new(value, angle))?;
                }
            }
            RampQuantity::Angle => {
                for &channel in &point.channels {
                    let base = point.base.channel_or_zero(channel);
                    phasors = phasors
                        .with_channel(channel, Phasor::new(base.magnitude, base.angle_deg + value))?;
                }
            }
        }
        Ok((self.io.frequency(), phasors))
    }
}

impl RelayTest for RampTest {
    type Point = RampPoint;
    type Outcome = RampOutcome;

    fn kind(&self) -> &'static str {
        "ramping"
    }

    fn io(&self) -> &TesterIo {
        &self.io
    }

    fn validate(&self, point: &RampPoint) -> Result<(), TesterError> {
        let invalid = |reason: String| Err(TesterError::InvalidPoint(reason));
        if !(point.step.is_finite() && point.step > 0.0) {
            return invalid(format!("step {} must be positive", point.step));
        }
        if !(point.start.is_finite() && point.end.is_finite()) {
            return invalid("ramp bounds must be finite".into());
        }
        if point.step_duration.is_zero() {
            return invalid("step duration must be positive".into());
        }
        match point.quantity {
            RampQuantity::Frequency => {
                if point.start <= 0.0 || point.end <= 0.0 {
                    return invalid("frequency ramp must stay above 0 Hz".into());
                }
            }
            RampQuantity::Magnitude | RampQuantity::Angle => {
                if point.channels.is_empty() {
                    return invalid(format!("{} ramp needs at least one channel", point.quantity));
                }
                if let Some(channel) = point.channels.iter().find(|&&c| c >= MAX_CHANNELS) {
                    return invalid(format!("channel {channel} out of range"));
                }
                if point.quantity == RampQuantity::Magnitude && point.start.min(point.end) < 0.0 {
                    return invalid("magnitudes must not be negative".into());
                }
            }
        }
        Ok(())
    }

    fn execute(&self, point: &RampPoint, control: &WaitControl) -> Result<RampOutcome, TesterError> {
        let values = ramp_values(point.start, point.end, point.step);
        let mut outcome = RampOutcome {
            quantity: point.quantity,
            tripped: false,
            pickup: None,
            trip_secs: None,
            steps_applied: 0,
            last_value: point.start,
        };

        self.io.arm();
        for value in values {
            let (frequency, phasors) = self.output(point, value)?;
            self.io.apply_to(self.io.stream_id(), frequency, &phasors)?;
            outcome.steps_applied += 1;
            outcome.last_value = value;
            debug!(quantity = %point.quantity, value, "ramp step applied");

            let trip = match self.io.await_trip(point.step_duration, control) {
                Ok(trip) => trip,
                Err(err) => {
                    self.io.apply(&point.base)?;
                    return Err(err);
                }
            };
            if let Some(elapsed) = trip {
                outcome.tripped = true;
                outcome.pickup = Some(value);
                outcome.trip_secs = Some(elapsed.as_secs_f64());
                break;
            }
        }
        self.io.apply(&point.base)?;
        info!(
            quantity = %point.quantity,
            pickup = ?outcome.pickup,
            steps = outcome.steps_applied,
            "ramp finished"
        );
        Ok(outcome)
    }
}

pub type RampingTester = Tester<RampTest>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_values_cover_both_directions() {
        assert_eq!(ramp_values(1.0, 1.5, 0.25), vec![1.0, 1.25, 1.5]);
        assert_eq!(ramp_values(60.0, 59.0, 0.5), vec![60.0, 59.5, 59.0]);
        assert_eq!(ramp_values(0.0, 1.0, 0.4), vec![0.0, 0.4, 0.8, 1.0]);
        assert_eq!(ramp_values(2.0, 2.0, 0.1), vec![2.0]);
    }

    #[test]
    fn ramp_quantity_parses() {
        assert_eq!("Frequency".parse::<RampQuantity>().unwrap(), RampQuantity::Frequency);
        assert_eq!(RampQuantity::Angle.to_string(), "angle");
    }
}
