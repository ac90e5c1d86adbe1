//! ---
//! prt_section: "07-relay-testers"
//! prt_subsection: "tests"
//! prt_type: "source"
//! prt_scope: "tests"
//! prt_description: "Relay testers against a simulated relay behind a phasor sink."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use r_prt_common::{PhasorSet, PhasorSink, SinkError, TesterConfig, TripSignal};
use r_prt_fault::{FaultType, Impedance, SourceImpedance};
use r_prt_testers::{
    DifferentialPoint, DifferentialSettings, DifferentialTest, DifferentialTester,
    DistancePoint, DistanceSettings, DistanceTest, DistanceTester, Expectation, IdmtCurve,
    OvercurrentPoint, OvercurrentSettings, OvercurrentTest, OvercurrentTester, RampPoint,
    RampQuantity, RampTest, RampingTester, TesterIo, TesterStatus,
};

type Decide = dyn Fn(&str, f64, &PhasorSet) -> Option<Duration> + Send + Sync;

/// Relay model behind a phasor sink: every apply is judged, and a positive
/// decision raises the trip after the decided delay unless newer phasors
/// arrived in the meantime.
struct SimulatedRelay {
    trip: TripSignal,
    generation: Arc<AtomicU64>,
    decide: Box<Decide>,
    applied: Mutex<Vec<(String, f64)>>,
}

impl SimulatedRelay {
    fn new(
        trip: TripSignal,
        decide: impl Fn(&str, f64, &PhasorSet) -> Option<Duration> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            trip,
            generation: Arc::new(AtomicU64::new(0)),
            decide: Box::new(decide),
            applied: Mutex::new(Vec::new()),
        })
    }
}

impl PhasorSink for SimulatedRelay {
    fn apply(&self, stream_id: &str, frequency: f64, phasors: &PhasorSet) -> Result<(), SinkError> {
        self.applied.lock().push((stream_id.to_owned(), frequency));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = (self.decide)(stream_id, frequency, phasors) {
            let trip = self.trip.clone();
            let current = Arc::clone(&self.generation);
            thread::spawn(move || {
                thread::sleep(delay);
                if current.load(Ordering::SeqCst) == generation {
                    trip.set();
                }
            });
        }
        Ok(())
    }
}

fn config() -> TesterConfig {
    TesterConfig {
        poll_interval: Duration::from_millis(5),
    }
}

fn wait_done<F: Fn() -> TesterStatus>(status: F) -> TesterStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    while status() == TesterStatus::Running && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    status()
}

#[test]
fn magnitude_ramp_finds_pickup() -> Result<()> {
    let trip = TripSignal::new();
    let relay = SimulatedRelay::new(trip.clone(), |_, _, phasors| {
        (phasors.channel_or_zero(4).magnitude >= 1.5 - 1e-9).then(|| Duration::from_millis(20))
    });
    let io = TesterIo::new(relay.clone(), trip, "MU01", 60.0, &config());
    let tester = RampingTester::new(RampTest::new(io));

    let outcome = tester.run_point(RampPoint {
        base: PhasorSet::balanced(63.5, 1.0, 0.0),
        channels: vec![4, 5, 6],
        quantity: RampQuantity::Magnitude,
        start: 1.0,
        end: 2.0,
        step: 0.1,
        step_duration: Duration::from_millis(100),
    })?;

    assert!(outcome.tripped);
    assert!((outcome.pickup.unwrap() - 1.5).abs() < 1e-9);
    assert_eq!(outcome.steps_applied, 6);
    assert!(outcome.trip_secs.unwrap() < 0.1);
    assert_eq!(tester.status(), TesterStatus::Completed);
    // Last apply restores the base set.
    assert_eq!(relay.applied.lock().len(), 7);
    Ok(())
}

#[test]
fn frequency_ramp_without_trip_runs_to_end() -> Result<()> {
    let trip = TripSignal::new();
    let relay = SimulatedRelay::new(trip.clone(), |_, _, _| None);
    let io = TesterIo::new(relay.clone(), trip, "MU01", 60.0, &config());
    let tester = RampingTester::new(RampTest::new(io));

    let outcome = tester.run_point(RampPoint {
        base: PhasorSet::balanced(63.5, 1.0, 0.0),
        channels: Vec::new(),
        quantity: RampQuantity::Frequency,
        start: 60.0,
        end: 59.8,
        step: 0.1,
        step_duration: Duration::from_millis(20),
    })?;

    assert!(!outcome.tripped);
    assert_eq!(outcome.pickup, None);
    assert!((outcome.last_value - 59.8).abs() < 1e-9);
    let frequencies: Vec<f64> = relay.applied.lock().iter().map(|(_, f)| *f).collect();
    assert_eq!(frequencies.len(), 4);
    assert!((frequencies[1] - 59.9).abs() < 1e-9);
    assert_eq!(frequencies[3], 60.0);
    Ok(())
}

#[test]
fn overcurrent_batch_checks_idmt_timing() -> Result<()> {
    let pickup = 1.0;
    let tms = 0.05;
    let trip = TripSignal::new();
    let relay = SimulatedRelay::new(trip.clone(), move |_, _, phasors| {
        let current = phasors.channel_or_zero(4).magnitude;
        IdmtCurve::IecVeryInverse
            .trip_time(current / pickup, tms)
            .map(Duration::from_secs_f64)
    });
    let io = TesterIo::new(relay, trip, "MU01", 60.0, &config());
    let mut settings = OvercurrentSettings::new(pickup, tms, IdmtCurve::IecVeryInverse);
    settings.no_trip_window = Duration::from_millis(200);
    let tester = OvercurrentTester::new(OvercurrentTest::new(io, settings)?);

    tester.start(vec![
        OvercurrentPoint::new(5.0, FaultType::AG),
        OvercurrentPoint::new(10.0, FaultType::ABC),
        OvercurrentPoint::new(0.8, FaultType::AG),
    ])?;
    assert_eq!(wait_done(|| tester.status()), TesterStatus::Completed);

    let results = tester.results();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.passed), "{results:?}");
    assert!((results[0].expected_secs.unwrap() - 0.16875).abs() < 1e-9);
    assert!(results[0].measured_secs.is_some());
    assert_eq!(results[2].expected_secs, None);
    assert_eq!(results[2].measured_secs, None);
    Ok(())
}

#[test]
fn overcurrent_detects_slow_relay() -> Result<()> {
    let trip = TripSignal::new();
    // Relay set to twice the expected time multiplier.
    let relay = SimulatedRelay::new(trip.clone(), |_, _, phasors| {
        IdmtCurve::IecVeryInverse
            .trip_time(phasors.channel_or_zero(4).magnitude, 0.1)
            .map(Duration::from_secs_f64)
    });
    let io = TesterIo::new(relay, trip, "MU01", 60.0, &config());
    let settings = OvercurrentSettings::new(1.0, 0.05, IdmtCurve::IecVeryInverse);
    let tester = OvercurrentTester::new(OvercurrentTest::new(io, settings)?);

    let outcome = tester.run_point(OvercurrentPoint::new(10.0, FaultType::AG))?;
    assert!(!outcome.passed);
    Ok(())
}

#[test]
fn distance_points_follow_reach() -> Result<()> {
    let trip = TripSignal::new();
    // Phase A mho-like element with a 4 ohm circular reach around the origin.
    let relay = SimulatedRelay::new(trip.clone(), |_, _, phasors| {
        let v = phasors.channel_or_zero(0).magnitude;
        let i = phasors.channel_or_zero(4).magnitude;
        (i > 0.5 && v / i < 4.0).then(|| Duration::from_millis(30))
    });
    let io = TesterIo::new(relay, trip, "MU01", 60.0, &config());
    let source = SourceImpedance::new(Impedance::new(1.0, 5.0), Impedance::new(3.0, 15.0), 63.5);
    let settings = DistanceSettings::new(
        source,
        Duration::from_millis(50),
        Duration::from_millis(300),
    );
    let tester = DistanceTester::new(DistanceTest::new(io, settings)?);

    let inside = tester.run_point(DistancePoint::new(1.0, 2.0, FaultType::AG, Expectation::Trip))?;
    assert!(inside.tripped, "{inside:?}");
    assert!(inside.passed);

    let outside =
        tester.run_point(DistancePoint::new(6.0, 8.0, FaultType::AG, Expectation::NoTrip))?;
    assert!(!outside.tripped, "{outside:?}");
    assert!(outside.passed);

    let wrong = tester.run_point(DistancePoint::new(6.0, 8.0, FaultType::AG, Expectation::Trip))?;
    assert!(!wrong.passed);
    Ok(())
}

#[test]
fn differential_points_follow_characteristic() -> Result<()> {
    let settings = DifferentialSettings {
        pickup_amps: 0.3,
        slope1_pct: 25.0,
        slope2_pct: 50.0,
        breakpoint_amps: 2.0,
        voltage: 63.5,
        timeout: Duration::from_millis(200),
    };
    let trip = TripSignal::new();
    let side1 = Arc::new(Mutex::new(0.0_f64));
    let relay = {
        let settings = settings.clone();
        let side1 = Arc::clone(&side1);
        SimulatedRelay::new(trip.clone(), move |stream, _, phasors| {
            let current = phasors.channel_or_zero(4).magnitude;
            if stream == "MU01" {
                *side1.lock() = current;
                return None;
            }
            let i1 = *side1.lock();
            let bias = (i1 + current) / 2.0;
            settings
                .operates(bias, i1 - current)
                .then(|| Duration::from_millis(25))
        })
    };
    let io = TesterIo::new(relay, trip, "MU01", 60.0, &config());
    let tester = DifferentialTester::new(DifferentialTest::new(io, "MU02", settings)?);

    tester.start(vec![
        DifferentialPoint::new(1.0, 0.6),
        DifferentialPoint::new(4.0, 1.0),
        DifferentialPoint::new(4.0, 2.0),
    ])?;
    assert_eq!(wait_done(|| tester.status()), TesterStatus::Completed);
    let results = tester.results();
    let tripped: Vec<bool> = results.iter().map(|r| r.tripped).collect();
    assert_eq!(tripped, vec![true, false, true]);
    assert!(results.iter().all(|r| r.passed));
    Ok(())
}

#[test]
fn stopping_a_batch_twice_is_safe() -> Result<()> {
    let trip = TripSignal::new();
    let relay = SimulatedRelay::new(trip.clone(), |_, _, _| None);
    let io = TesterIo::new(relay, trip, "MU01", 60.0, &config());
    let tester = RampingTester::new(RampTest::new(io));
    let slow = RampPoint {
        base: PhasorSet::balanced(63.5, 1.0, 0.0),
        channels: vec![4],
        quantity: RampQuantity::Magnitude,
        start: 0.0,
        end: 10.0,
        step: 0.1,
        step_duration: Duration::from_secs(1),
    };
    tester.start(vec![slow])?;
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    assert!(tester.stop());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(tester.status(), TesterStatus::Stopped);
    assert!(!tester.stop());
    assert_eq!(tester.status(), TesterStatus::Stopped);
    assert!(tester.results().is_empty());
    Ok(())
}

#[test]
fn states_are_applied_at_the_stream_frequency() -> Result<()> {
    let trip = TripSignal::new();
    let relay = SimulatedRelay::new(trip.clone(), |_, _, _| None);
    let io = TesterIo::new(relay.clone(), trip, "MU50", 50.0, &config());
    let tester = RampingTester::new(RampTest::new(io));

    let outcome = tester.run_point(RampPoint {
        base: PhasorSet::balanced(63.5, 1.0, 0.0),
        channels: vec![4],
        quantity: RampQuantity::Magnitude,
        start: 1.0,
        end: 1.2,
        step: 0.1,
        step_duration: Duration::from_millis(10),
    })?;

    assert!(!outcome.tripped);
    let applied = relay.applied.lock();
    assert!(!applied.is_empty());
    assert!(applied.iter().all(|(id, f)| id == "MU50" && *f == 50.0));
    Ok(())
}
