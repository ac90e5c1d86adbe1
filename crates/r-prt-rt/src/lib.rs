//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Runtime helpers supporting the codec tick drivers and workers."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Real-time scheduling helpers for the R-PRT runtime.
//!
//! Every long-lived component runs on its own OS thread. Tick drivers ask for
//! SCHED_FIFO scheduling and fall back to best-effort timing when the platform or
//! the process privileges do not allow it.

pub mod scheduling;
pub mod thread;

pub use scheduling::{PeriodicTimer, StopFlag, TimerTick, WorkerHandle};
pub use thread::{spawn_rt_thread, RtConfig, RtError, RtPriority};
