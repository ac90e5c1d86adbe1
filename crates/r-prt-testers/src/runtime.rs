//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Point runner shared by all relay testers: status, results and worker."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Every tester is a [`RelayTest`] (how to run one point) wrapped in a [`Tester`]
//! (when to run it). A single point runs synchronously through
//! [`Tester::run_point`]; a batch runs on its own thread through [`Tester::start`]
//! and is cancelled with [`Tester::stop`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use r_prt_common::LastError;
use r_prt_rt::{RtConfig, StopFlag, WorkerHandle};
use r_prt_sequence::WaitControl;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info, warn};

use crate::error::TesterError;
use crate::io::TesterIo;

/// Lifecycle of a tester. `Completed`, `Stopped` and `Error` hold until the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TesterStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    Error,
}

/// Whether the relay is expected to operate for a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Expectation {
    Trip,
    NoTrip,
}

impl Expectation {
    pub fn from_trip(trip: bool) -> Self {
        if trip {
            Expectation::Trip
        } else {
            Expectation::NoTrip
        }
    }

    pub fn expects_trip(self) -> bool {
        self == Expectation::Trip
    }
}

/// One kind of relay test.
pub trait RelayTest: Send + Sync + 'static {
    type Point: Clone + Send + Sync + 'static;
    type Outcome: Clone + Send + 'static;

    /// Short name used for thread names and log fields.
    fn kind(&self) -> &'static str;

    fn io(&self) -> &TesterIo;

    /// Reject a point before anything is applied.
    fn validate(&self, _point: &Self::Point) -> Result<(), TesterError> {
        Ok(())
    }

    /// Apply the point, observe the relay and leave the stream healthy again.
    /// Returns [`TesterError::Interrupted`] when `control` is stopped.
    fn execute(
        &self,
        point: &Self::Point,
        control: &WaitControl,
    ) -> Result<Self::Outcome, TesterError>;
}

/// Progress counters of the current or last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TesterProgress {
    pub status: TesterStatus,
    pub completed: usize,
    pub total: usize,
}

struct RunState<O> {
    status: TesterStatus,
    results: Vec<O>,
    total: usize,
    point_stop: Option<StopFlag>,
}

impl<O> Default for RunState<O> {
    fn default() -> Self {
        Self {
            status: TesterStatus::Idle,
            results: Vec::new(),
            total: 0,
            point_stop: None,
        }
    }
}

struct Shared<O> {
    kind: &'static str,
    run: Mutex<RunState<O>>,
    last_error: LastError,
}

impl<O> Shared<O> {
    fn begin(&self, total: usize, point_stop: Option<StopFlag>) -> Result<(), TesterError> {
        let mut run = self.run.lock();
        if run.status == TesterStatus::Running {
            return Err(self.last_error.capture(TesterError::AlreadyRunning));
        }
        *run = RunState {
            status: TesterStatus::Running,
            results: Vec::new(),
            total,
            point_stop,
        };
        Ok(())
    }

    fn push(&self, outcome: O) {
        self.run.lock().results.push(outcome);
    }

    /// Move to `status` unless a terminal status was already recorded.
    fn finish(&self, status: TesterStatus) -> bool {
        let mut run = self.run.lock();
        if run.status != TesterStatus::Running {
            return false;
        }
        run.status = status;
        run.point_stop = None;
        true
    }

    fn fail(&self, err: &TesterError) {
        warn!(tester = self.kind, error = %err, "test run failed");
        self.last_error.record(err.to_string());
        self.finish(TesterStatus::Error);
    }
}

/// Runs the points of one [`RelayTest`] and keeps their outcomes.
pub struct Tester<T: RelayTest> {
    test: Arc<T>,
    shared: Arc<Shared<T::Outcome>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl<T: RelayTest> fmt::Debug for Tester<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tester")
            .field("kind", &self.test.kind())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<T: RelayTest> Tester<T> {
    pub fn new(test: T) -> Self {
        let kind = test.kind();
        Self {
            test: Arc::new(test),
            shared: Arc::new(Shared {
                kind,
                run: Mutex::new(RunState::default()),
                last_error: LastError::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn test(&self) -> &T {
        &self.test
    }

    /// Execute one point on the calling thread. The outcome is also kept in
    /// [`results`](Self::results).
    pub fn run_point(&self, point: T::Point) -> Result<T::Outcome, TesterError> {
        if let Err(err) = self.test.validate(&point) {
            return Err(self.shared.last_error.capture(err));
        }
        let stop = StopFlag::new();
        {
            let _slot = self.worker.lock();
            self.shared.begin(1, Some(stop.clone()))?;
        }
        let control = self.test.io().control(&stop);
        match self.test.execute(&point, &control) {
            Ok(outcome) => {
                self.shared.push(outcome.clone());
                self.shared.finish(TesterStatus::Completed);
                Ok(outcome)
            }
            Err(TesterError::Interrupted) => {
                self.shared.finish(TesterStatus::Stopped);
                Err(TesterError::Interrupted)
            }
            Err(err) => {
                self.shared.fail(&err);
                Err(err)
            }
        }
    }

    /// Run `points` in order on a worker thread.
    pub fn start(&self, points: Vec<T::Point>) -> Result<(), TesterError> {
        let mut slot = self.worker.lock();
        if points.is_empty() {
            return Err(self.shared.last_error.capture(TesterError::NoPoints));
        }
        for point in &points {
            if let Err(err) = self.test.validate(point) {
                return Err(self.shared.last_error.capture(err));
            }
        }
        self.shared.begin(points.len(), None)?;
        if let Some(previous) = slot.take() {
            previous.stop();
        }

        let test = Arc::clone(&self.test);
        let shared = Arc::clone(&self.shared);
        let total = points.len();
        let name = format!("tester-{}", test.kind());
        let spawned = WorkerHandle::spawn(RtConfig::new(name), move |stop| {
            let control = test.io().control(&stop);
            for (index, point) in points.iter().enumerate() {
                if stop.is_requested() {
                    break;
                }
                match test.execute(point, &control) {
                    Ok(outcome) => {
                        debug!(tester = test.kind(), index, "test point finished");
                        shared.push(outcome);
                    }
                    Err(TesterError::Interrupted) => break,
                    Err(err) => {
                        shared.fail(&err);
                        return;
                    }
                }
            }
            let status = if stop.is_requested() {
                TesterStatus::Stopped
            } else {
                TesterStatus::Completed
            };
            if shared.finish(status) {
                info!(tester = test.kind(), %status, "test run finished");
            }
        });
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                info!(tester = self.test.kind(), points = total, "test run started");
                Ok(())
            }
            Err(err) => {
                let err = TesterError::from(err);
                self.shared.fail(&err);
                Err(err)
            }
        }
    }

    /// Cancel the active run and wait for it. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let handle = self.worker.lock().take();
        let (was_running, point_stop) = {
            let run = self.shared.run.lock();
            (run.status == TesterStatus::Running, run.point_stop.clone())
        };
        if let Some(flag) = point_stop {
            flag.request();
        }
        if let Some(handle) = handle {
            handle.stop();
        }
        if was_running && self.shared.finish(TesterStatus::Stopped) {
            info!(tester = self.test.kind(), "test run stopped");
        }
        was_running
    }

    pub fn status(&self) -> TesterStatus {
        self.shared.run.lock().status
    }

    pub fn progress(&self) -> TesterProgress {
        let run = self.shared.run.lock();
        TesterProgress {
            status: run.status,
            completed: run.results.len(),
            total: run.total,
        }
    }

    /// Outcomes of the current or last run, in point order.
    pub fn results(&self) -> Vec<T::Outcome> {
        self.shared.run.lock().results.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.get()
    }
}

impl<T: RelayTest> Drop for Tester<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
