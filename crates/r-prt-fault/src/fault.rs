//! ---
//! prt_section: "04-fault-models"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sequence-network fault calculations for the ten shunt fault topologies."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Classical sequence-network fault solutions.
//!
//! Each topology is solved with phase A as the reference phase and then rotated onto
//! the actual phases. For the line-to-line and double-line-to-ground families the
//! reference is the healthy phase.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::model::{to_phasor, FaultType, Impedance, Phase, PhasorState, SourceImpedance};
use crate::symmetrical::to_phase;

/// Smallest loop impedance used in a division, in ohms.
pub const MIN_LOOP_IMPEDANCE: f64 = 1e-6;

/// Inputs of one fault computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultSpec {
    pub fault_type: FaultType,
    pub fault_impedance: Impedance,
    pub source: SourceImpedance,
}

impl FaultSpec {
    pub fn calculate(&self) -> PhasorState {
        calculate_fault(self.fault_type, &self.fault_impedance, &self.source)
    }
}

#[derive(Debug, Clone, Copy)]
struct SequenceSolution {
    currents: [Complex64; 3],
    voltages: [Complex64; 3],
}

/// Phase voltages and currents seen at the relay for the given fault.
///
/// Phases not involved in the fault keep their pre-fault voltage and carry no
/// current.
pub fn calculate_fault(
    fault_type: FaultType,
    fault_impedance: &Impedance,
    source: &SourceImpedance,
) -> PhasorState {
    let vf = Complex64::new(source.prefault_voltage, 0.0);
    let z1 = source.positive.to_complex();
    let z2 = z1;
    let z0 = source.zero.to_complex();
    let zf = fault_impedance.to_complex();

    let solution = match fault_type {
        FaultType::AG | FaultType::BG | FaultType::CG => {
            let i0 = vf / floor(z1 + z2 + z0 + 3.0 * zf);
            sequence_solution(vf, [z0, z1, z2], [i0, i0, i0])
        }
        FaultType::BC | FaultType::CA | FaultType::AB => {
            let i1 = vf / floor(z1 + z2 + zf);
            sequence_solution(vf, [z0, z1, z2], [Complex64::new(0.0, 0.0), i1, -i1])
        }
        FaultType::BCG | FaultType::CAG | FaultType::ABG => {
            let zg = z0 + 3.0 * zf;
            let parallel = z2 * zg / floor(z2 + zg);
            let i1 = vf / floor(z1 + parallel);
            let share = floor(z2 + zg);
            let i2 = -i1 * zg / share;
            let i0 = -i1 * z2 / share;
            sequence_solution(vf, [z0, z1, z2], [i0, i1, i2])
        }
        FaultType::ABC => {
            let i1 = vf / floor(z1 + zf);
            let zero = Complex64::new(0.0, 0.0);
            sequence_solution(vf, [z0, z1, z2], [zero, i1, zero])
        }
    };

    let voltages = rotate(to_phase(solution.voltages), reference_shift(fault_type));
    let currents = rotate(to_phase(solution.currents), reference_shift(fault_type));

    let mut state = PhasorState::prefault(source.prefault_voltage, 0.0, 0.0);
    for phase in [Phase::A, Phase::B, Phase::C] {
        if fault_type.is_faulted(phase) {
            let index = phase.index();
            state.voltages[index] = to_phasor(voltages[index]);
            state.currents[index] = to_phasor(currents[index]);
        }
    }
    state
}

fn sequence_solution(
    vf: Complex64,
    [z0, z1, z2]: [Complex64; 3],
    currents: [Complex64; 3],
) -> SequenceSolution {
    let [i0, i1, i2] = currents;
    SequenceSolution {
        currents,
        voltages: [-z0 * i0, vf - z1 * i1, -z2 * i2],
    }
}

fn floor(z: Complex64) -> Complex64 {
    if z.norm() < MIN_LOOP_IMPEDANCE {
        Complex64::new(MIN_LOOP_IMPEDANCE, 0.0)
    } else {
        z
    }
}

/// Number of 120° steps from phase A to the topology's reference phase.
fn reference_shift(fault_type: FaultType) -> usize {
    match fault_type {
        FaultType::AG | FaultType::BC | FaultType::BCG | FaultType::ABC => 0,
        FaultType::BG | FaultType::CA | FaultType::CAG => 1,
        FaultType::CG | FaultType::AB | FaultType::ABG => 2,
    }
}

/// Move a solution computed for reference phase A onto reference phase `shift`.
fn rotate(computed: [Complex64; 3], shift: usize) -> [Complex64; 3] {
    let step = Complex64::from_polar(1.0, (-120.0 * shift as f64).to_radians());
    let mut actual = [Complex64::new(0.0, 0.0); 3];
    for (j, value) in computed.iter().enumerate() {
        actual[(j + shift) % 3] = value * step;
    }
    actual
}
