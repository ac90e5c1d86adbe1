//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Sample period helper for tick drivers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::time::Duration;

/// Sample period for a given rate. Zero rates yield a zero period.
pub fn sample_period(sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(1_000_000_000 / u64::from(sample_rate))
}
