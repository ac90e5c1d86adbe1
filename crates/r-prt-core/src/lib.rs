//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Test bench wiring and lifecycle management."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Test bench, bench configuration and the Sampled Value receive path for R-PRT.

pub mod bench;
pub mod config;
pub mod monitor;

pub use bench::TestBench;
pub use config::BenchConfig;
pub use monitor::{MonitorStats, SvMonitor};
