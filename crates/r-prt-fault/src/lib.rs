//! ---
//! prt_section: "04-fault-models"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Fault phasor synthesizer exports."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Converts a fault type, fault impedance and source impedance into the phase
//! voltages and currents a relay would measure. Pure functions only.

pub mod errors;
pub mod fault;
pub mod model;
pub mod symmetrical;

pub use errors::{FaultError, Result};
pub use fault::{calculate_fault, FaultSpec, MIN_LOOP_IMPEDANCE};
pub use model::{FaultType, Impedance, Phase, PhasorState, SourceImpedance};
