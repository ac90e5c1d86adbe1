//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Thread spawning with real-time priority, affinity and memory locking."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::thread::{self, JoinHandle};

use r_prt_common::CodecConfig;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RtError {
    #[error("failed to spawn thread {name}: {reason}")]
    SpawnFailed { name: String, reason: String },
    #[error("failed to set SCHED_FIFO priority {priority}: {reason}")]
    PriorityFailed { priority: i32, reason: String },
    #[error("failed to set CPU affinity: {0}")]
    AffinityFailed(String),
    #[error("failed to lock memory: {0}")]
    MlockFailed(String),
}

/// Scheduling class requested for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtPriority {
    #[default]
    Normal,
    /// SCHED_FIFO at the given level, clamped to 1..=99.
    Fifo(i32),
}

impl RtPriority {
    pub fn is_realtime(&self) -> bool {
        matches!(self, RtPriority::Fifo(_))
    }

    pub fn fifo_level(&self) -> Option<i32> {
        match self {
            RtPriority::Normal => None,
            RtPriority::Fifo(level) => Some((*level).clamp(1, 99)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtConfig {
    pub name: String,
    pub priority: RtPriority,
    pub cpu_affinity: Vec<usize>,
    /// Zero keeps the platform default.
    pub stack_size: usize,
    pub lock_memory: bool,
}

impl RtConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: RtPriority::Normal,
            cpu_affinity: Vec::new(),
            stack_size: 0,
            lock_memory: false,
        }
    }

    /// Tick driver settings taken from the `[codec]` section.
    pub fn from_codec(name: impl Into<String>, codec: &CodecConfig) -> Self {
        Self {
            name: name.into(),
            priority: codec
                .tick_priority
                .map(RtPriority::Fifo)
                .unwrap_or(RtPriority::Normal),
            cpu_affinity: codec.cpu_affinity.clone(),
            stack_size: 0,
            lock_memory: codec.lock_memory,
        }
    }

    pub fn with_priority(mut self, priority: RtPriority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for RtConfig {
    fn default() -> Self {
        Self::new("r-prt-worker")
    }
}

/// Spawn a named thread and apply the real-time settings from inside it.
///
/// Missing privileges (CAP_SYS_NICE, RLIMIT_MEMLOCK) are logged and the thread keeps
/// running with best-effort timing. Only the spawn itself can fail.
pub fn spawn_rt_thread<F, T>(config: RtConfig, f: F) -> Result<JoinHandle<T>, RtError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let mut builder = thread::Builder::new().name(config.name.clone());
    if config.stack_size > 0 {
        builder = builder.stack_size(config.stack_size);
    }
    let name = config.name.clone();
    builder
        .spawn(move || {
            apply_rt_settings(&config);
            f()
        })
        .map_err(|err| RtError::SpawnFailed {
            name,
            reason: err.to_string(),
        })
}

fn apply_rt_settings(config: &RtConfig) {
    if let Some(level) = config.priority.fifo_level() {
        match set_fifo_priority(level) {
            Ok(()) => debug!(thread = %config.name, priority = level, "SCHED_FIFO applied"),
            Err(err) => warn!(thread = %config.name, error = %err, "running without real-time priority"),
        }
    }
    if !config.cpu_affinity.is_empty() {
        if let Err(err) = set_cpu_affinity(&config.cpu_affinity) {
            warn!(thread = %config.name, error = %err, "CPU affinity not applied");
        }
    }
    if config.lock_memory {
        if let Err(err) = lock_all_memory() {
            warn!(thread = %config.name, error = %err, "memory not locked");
        }
    }
}

#[cfg(target_os = "linux")]
fn set_fifo_priority(level: i32) -> Result<(), RtError> {
    // SAFETY: sched_param is plain data; pid 0 targets the calling thread.
    let result = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = level;
        libc::sched_setscheduler(0, libc::SCHED_FIFO, &param)
    };
    if result != 0 {
        return Err(RtError::PriorityFailed {
            priority: level,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_fifo_priority(_level: i32) -> Result<(), RtError> {
    debug!("SCHED_FIFO not supported on this platform");
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_cpu_affinity(cpus: &[usize]) -> Result<(), RtError> {
    // SAFETY: cpu_set_t is a plain bit mask initialised through CPU_ZERO.
    let result = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &cpu in cpus {
            if cpu < libc::CPU_SETSIZE as usize {
                libc::CPU_SET(cpu, &mut set);
            }
        }
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if result != 0 {
        return Err(RtError::AffinityFailed(
            std::io::Error::last_os_error().to_string(),
        ));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(_cpus: &[usize]) -> Result<(), RtError> {
    debug!("CPU affinity not supported on this platform");
    Ok(())
}

#[cfg(target_os = "linux")]
fn lock_all_memory() -> Result<(), RtError> {
    // SAFETY: mlockall takes only flag bits.
    let result = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if result != 0 {
        return Err(RtError::MlockFailed(
            std::io::Error::last_os_error().to_string(),
        ));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn lock_all_memory() -> Result<(), RtError> {
    debug!("memory locking not supported on this platform");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_level_is_clamped() {
        assert_eq!(RtPriority::Normal.fifo_level(), None);
        assert_eq!(RtPriority::Fifo(150).fifo_level(), Some(99));
        assert_eq!(RtPriority::Fifo(0).fifo_level(), Some(1));
        assert!(RtPriority::Fifo(80).is_realtime());
    }

    #[test]
    fn config_follows_codec_section() {
        let codec = CodecConfig {
            tick_priority: Some(80),
            cpu_affinity: vec![2],
            ..CodecConfig::default()
        };
        let config = RtConfig::from_codec("sv-tick", &codec);
        assert_eq!(config.priority, RtPriority::Fifo(80));
        assert_eq!(config.cpu_affinity, vec![2]);
        assert_eq!(RtConfig::from_codec("x", &CodecConfig::default()).priority, RtPriority::Normal);
    }

    #[test]
    fn spawn_degrades_without_privileges() {
        // Unprivileged test runners cannot get SCHED_FIFO; the closure must still run.
        let config = RtConfig::new("rt-test").with_priority(RtPriority::Fifo(90));
        let handle = spawn_rt_thread(config, || thread::current().name().map(str::to_owned)).unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("rt-test"));
    }
}
