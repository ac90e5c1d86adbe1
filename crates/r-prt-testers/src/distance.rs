//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Impedance-plane test points driven through the fault synthesizer."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::time::Duration;

use r_prt_fault::{calculate_fault, FaultType, Impedance, PhasorState, SourceImpedance};
use r_prt_sequence::WaitControl;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::info;

use crate::error::TesterError;
use crate::io::TesterIo;
use crate::runtime::{Expectation, RelayTest, Tester};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceSettings {
    pub source: SourceImpedance,
    /// Healthy load current, RMS.
    #[serde(default)]
    pub load_current: f64,
    /// Angle by which the load current lags its voltage.
    #[serde(default)]
    pub load_angle_deg: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub prefault_duration: Duration,
    /// How long the fault is held while waiting for a trip.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub fault_duration: Duration,
    /// Optional operating-time limit for points expected to trip.
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub max_trip_time: Option<Duration>,
}

impl DistanceSettings {
    pub fn new(
        source: SourceImpedance,
        prefault_duration: Duration,
        fault_duration: Duration,
    ) -> Self {
        Self {
            source,
            load_current: 0.0,
            load_angle_deg: 0.0,
            prefault_duration,
            fault_duration,
            max_trip_time: None,
        }
    }
}

/// One point on the impedance plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistancePoint {
    pub resistance_ohm: f64,
    pub reactance_ohm: f64,
    pub fault_type: FaultType,
    pub expectation: Expectation,
}

impl DistancePoint {
    pub fn new(
        resistance_ohm: f64,
        reactance_ohm: f64,
        fault_type: FaultType,
        expectation: Expectation,
    ) -> Self {
        Self {
            resistance_ohm,
            reactance_ohm,
            fault_type,
            expectation,
        }
    }

    pub fn impedance(&self) -> Impedance {
        Impedance::new(self.resistance_ohm, self.reactance_ohm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceOutcome {
    pub point: DistancePoint,
    pub impedance_ohm: f64,
    pub tripped: bool,
    pub trip_secs: Option<f64>,
    pub passed: bool,
}

#[derive(Debug)]
pub struct DistanceTest {
    io: TesterIo,
    settings: DistanceSettings,
}

impl DistanceTest {
    pub fn new(io: TesterIo, settings: DistanceSettings) -> Result<Self, TesterError> {
        if settings.fault_duration.is_zero() {
            return Err(TesterError::InvalidSettings("fault duration must be positive".into()));
        }
        if !(settings.source.prefault_voltage > 0.0) {
            return Err(TesterError::InvalidSettings(
                "prefault voltage must be positive".into(),
            ));
        }
        Ok(Self { io, settings })
    }

    pub fn settings(&self) -> &DistanceSettings {
        &self.settings
    }

    fn healthy(&self) -> PhasorState {
        PhasorState::prefault(
            self.settings.source.prefault_voltage,
            self.settings.load_current,
            self.settings.load_angle_deg,
        )
    }
}

impl RelayTest for DistanceTest {
    type Point = DistancePoint;
    type Outcome = DistanceOutcome;

    fn kind(&self) -> &'static str {
        "distance"
    }

    fn io(&self) -> &TesterIo {
        &self.io
    }

    fn validate(&self, point: &DistancePoint) -> Result<(), TesterError> {
        if !(point.resistance_ohm.is_finite() && point.reactance_ohm.is_finite()) {
            return Err(TesterError::InvalidPoint("impedance must be finite".into()));
        }
        if point.resistance_ohm < 0.0 {
            return Err(TesterError::InvalidPoint(format!(
                "fault resistance {} must not be negative",
                point.resistance_ohm
            )));
        }
        Ok(())
    }

    fn execute(
        &self,
        point: &DistancePoint,
        control: &WaitControl,
    ) -> Result<DistanceOutcome, TesterError> {
        let healthy = self.healthy().to_phasor_set();
        self.io.apply(&healthy)?;
        self.io.hold(self.settings.prefault_duration, control)?;

        let fault = calculate_fault(point.fault_type, &point.impedance(), &self.settings.source);
        self.io.arm();
        self.io.apply(&fault.to_phasor_set())?;
        let trip = self.io.await_trip(self.settings.fault_duration, control);
        self.io.apply(&healthy)?;
        let trip = trip?;

        let passed = match point.expectation {
            Expectation::Trip => match (trip, self.settings.max_trip_time) {
                (Some(elapsed), Some(limit)) => elapsed <= limit,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Expectation::NoTrip => trip.is_none(),
        };
        info!(
            fault = %point.fault_type,
            r = point.resistance_ohm,
            x = point.reactance_ohm,
            tripped = trip.is_some(),
            passed,
            "distance point finished"
        );
        Ok(DistanceOutcome {
            point: *point,
            impedance_ohm: point.impedance().magnitude(),
            tripped: trip.is_some(),
            trip_secs: trip.map(|d| d.as_secs_f64()),
            passed,
        })
    }
}

pub type DistanceTester = Tester<DistanceTest>;
