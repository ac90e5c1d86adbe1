//! ---
//! prt_section: "04-fault-models"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Fault topologies, impedances and three-phase phasor state."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::str::FromStr;

use num_complex::Complex64;
use r_prt_common::{Phasor, PhasorSet};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::errors::{FaultError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Impedance {
    pub resistance_ohm: f64,
    pub reactance_ohm: f64,
}

impl Impedance {
    pub const ZERO: Impedance = Impedance {
        resistance_ohm: 0.0,
        reactance_ohm: 0.0,
    };

    pub fn new(resistance_ohm: f64, reactance_ohm: f64) -> Self {
        Self {
            resistance_ohm,
            reactance_ohm,
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.resistance_ohm.hypot(self.reactance_ohm)
    }

    pub fn to_complex(&self) -> Complex64 {
        Complex64::new(self.resistance_ohm, self.reactance_ohm)
    }
}

/// Thevenin source behind the relay: sequence impedances and pre-fault voltage.
/// The negative-sequence impedance is taken equal to the positive-sequence one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SourceImpedance {
    pub positive: Impedance,
    pub zero: Impedance,
    /// Line-to-neutral RMS volts.
    pub prefault_voltage: f64,
}

impl SourceImpedance {
    pub fn new(positive: Impedance, zero: Impedance, prefault_voltage: f64) -> Self {
        Self {
            positive,
            zero,
            prefault_voltage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub fn index(self) -> usize {
        match self {
            Phase::A => 0,
            Phase::B => 1,
            Phase::C => 2,
        }
    }
}

/// The ten shunt fault topologies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum FaultType {
    #[strum(to_string = "AG", serialize = "A-G")]
    AG,
    #[strum(to_string = "BG", serialize = "B-G")]
    BG,
    #[strum(to_string = "CG", serialize = "C-G")]
    CG,
    #[strum(to_string = "AB", serialize = "A-B")]
    AB,
    #[strum(to_string = "BC", serialize = "B-C")]
    BC,
    #[strum(to_string = "CA", serialize = "C-A")]
    CA,
    #[strum(to_string = "ABG", serialize = "A-B-G")]
    ABG,
    #[strum(to_string = "BCG", serialize = "B-C-G")]
    BCG,
    #[strum(to_string = "CAG", serialize = "C-A-G")]
    CAG,
    #[strum(to_string = "ABC", serialize = "A-B-C")]
    ABC,
}

impl FaultType {
    /// Parse helper reporting the offending text instead of a bare strum error.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_str(text.trim()).map_err(|_| FaultError::UnknownFaultType(text.to_owned()))
    }

    pub fn faulted_phases(self) -> &'static [Phase] {
        match self {
            FaultType::AG => &[Phase::A],
            FaultType::BG => &[Phase::B],
            FaultType::CG => &[Phase::C],
            FaultType::AB | FaultType::ABG => &[Phase::A, Phase::B],
            FaultType::BC | FaultType::BCG => &[Phase::B, Phase::C],
            FaultType::CA | FaultType::CAG => &[Phase::C, Phase::A],
            FaultType::ABC => &[Phase::A, Phase::B, Phase::C],
        }
    }

    pub fn involves_ground(self) -> bool {
        matches!(
            self,
            FaultType::AG
                | FaultType::BG
                | FaultType::CG
                | FaultType::ABG
                | FaultType::BCG
                | FaultType::CAG
        )
    }

    pub fn is_faulted(self, phase: Phase) -> bool {
        self.faulted_phases().contains(&phase)
    }
}

/// Three-phase voltages and currents, A/B/C order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorState {
    pub voltages: [Phasor; 3],
    pub currents: [Phasor; 3],
}

impl PhasorState {
    /// Balanced healthy state; currents lag their voltages by `current_lag_deg`.
    pub fn prefault(voltage: f64, current: f64, current_lag_deg: f64) -> Self {
        let angles = [0.0, -120.0, 120.0];
        Self {
            voltages: angles.map(|angle| Phasor::new(voltage, angle)),
            currents: angles.map(|angle| Phasor::new(current, angle - current_lag_deg)),
        }
    }

    pub fn voltage(&self, phase: Phase) -> Phasor {
        self.voltages[phase.index()]
    }

    pub fn current(&self, phase: Phase) -> Phasor {
        self.currents[phase.index()]
    }

    pub fn residual_voltage(&self) -> Phasor {
        residual(&self.voltages)
    }

    pub fn residual_current(&self) -> Phasor {
        residual(&self.currents)
    }

    /// `Va Vb Vc Vn Ia Ib Ic In`, with the neutral channels carrying the residuals.
    pub fn to_phasor_set(&self) -> PhasorSet {
        let [va, vb, vc] = self.voltages;
        let [ia, ib, ic] = self.currents;
        PhasorSet::from_channels([
            va,
            vb,
            vc,
            self.residual_voltage(),
            ia,
            ib,
            ic,
            self.residual_current(),
        ])
    }
}

pub(crate) fn to_complex(phasor: Phasor) -> Complex64 {
    let (re, im) = phasor.to_rect();
    Complex64::new(re, im)
}

pub(crate) fn to_phasor(value: Complex64) -> Phasor {
    Phasor::from_rect(value.re, value.im)
}

fn residual(phases: &[Phasor; 3]) -> Phasor {
    to_phasor(phases.iter().map(|p| to_complex(*p)).sum())
}
