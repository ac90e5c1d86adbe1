//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Stop flags, periodic timers and joined worker threads."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::thread::{spawn_rt_thread, RtConfig, RtError};

const DEFAULT_SPIN_SLACK: Duration = Duration::from_micros(50);

/// Outcome of one [`PeriodicTimer::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    OnTime,
    /// The deadline had already passed; `late` is how far behind the caller was.
    Overrun { late: Duration },
}

/// Absolute-deadline timer for fixed-rate loops.
///
/// Sleeps until shortly before the deadline and spins for the remainder. A caller
/// that falls more than one period behind is re-anchored to "now" instead of
/// bursting to catch up.
#[derive(Debug)]
pub struct PeriodicTimer {
    period: Duration,
    spin_slack: Duration,
    next_deadline: Instant,
    overruns: u64,
}

impl PeriodicTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            spin_slack: DEFAULT_SPIN_SLACK,
            next_deadline: Instant::now() + period,
            overruns: 0,
        }
    }

    pub fn with_spin_slack(mut self, slack: Duration) -> Self {
        self.spin_slack = slack;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn wait(&mut self) -> TimerTick {
        let now = Instant::now();
        if now >= self.next_deadline {
            let late = now - self.next_deadline;
            self.overruns += 1;
            self.next_deadline = if late >= self.period {
                now + self.period
            } else {
                self.next_deadline + self.period
            };
            return TimerTick::Overrun { late };
        }

        let remaining = self.next_deadline - now;
        if remaining > self.spin_slack {
            thread::sleep(remaining - self.spin_slack);
        }
        while Instant::now() < self.next_deadline {
            std::hint::spin_loop();
        }
        self.next_deadline += self.period;
        TimerTick::OnTime
    }
}

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `total` in slices of at most `slice`, returning early with `true`
    /// when a stop is requested.
    pub fn sleep(&self, total: Duration, slice: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }
}

/// Handle to a stoppable worker thread.
///
/// `stop` is synchronous: it raises the flag and joins. Repeated calls are no-ops.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    stop: StopFlag,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    pub fn spawn<F>(config: RtConfig, f: F) -> Result<Self, RtError>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let stop = StopFlag::new();
        let worker_stop = stop.clone();
        let name = config.name.clone();
        let join = spawn_rt_thread(config, move || f(worker_stop))?;
        debug!(worker = %name, "worker started");
        Ok(Self {
            name,
            stop,
            join: Mutex::new(Some(join)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join
            .lock()
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    pub fn stop(&self) {
        self.stop.request();
        let Some(join) = self.join.lock().take() else {
            return;
        };
        if join.thread().id() == thread::current().id() {
            // Called from inside the worker; it exits on its own after returning.
            return;
        }
        if join.join().is_err() {
            warn!(worker = %self.name, "worker thread panicked");
        } else {
            debug!(worker = %self.name, "worker stopped");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
