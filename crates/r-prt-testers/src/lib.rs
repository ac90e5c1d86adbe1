//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "01-bootstrap"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Relay tester exports."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Bounded test loops that drive phasors into a stream and watch the shared trip
//! signal: pickup ramps, inverse-time overcurrent, distance and differential.

pub mod differential;
pub mod distance;
pub mod error;
pub mod io;
pub mod overcurrent;
pub mod ramping;
pub mod runtime;

pub use differential::{
    DifferentialOutcome, DifferentialPoint, DifferentialSettings, DifferentialTest,
    DifferentialTester,
};
pub use distance::{DistanceOutcome, DistancePoint, DistanceSettings, DistanceTest, DistanceTester};
pub use error::TesterError;
pub use io::TesterIo;
pub use overcurrent::{
    IdmtCurve, OvercurrentOutcome, OvercurrentPoint, OvercurrentSettings, OvercurrentTest,
    OvercurrentTester,
};
pub use ramping::{ramp_values, RampOutcome, RampPoint, RampQuantity, RampTest, RampingTester};
pub use runtime::{Expectation, RelayTest, Tester, TesterProgress, TesterStatus};
