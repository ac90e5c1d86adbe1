//! ---
//! prt_section: "01-core-functionality"
//! prt_subsection: "tests"
//! prt_type: "source"
//! prt_scope: "tests"
//! prt_description: "Test bench wiring over loopback transports."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use r_prt_codec::{LoopbackTransport, NullTransport, StreamConfig};
use r_prt_common::PhasorSet;
use r_prt_core::{BenchConfig, TestBench};
use r_prt_fault::{FaultSpec, FaultType, Impedance, SourceImpedance};
use r_prt_metrics::new_registry;
use r_prt_testers::{DifferentialSettings, RelayTest, TesterStatus};
use r_prt_trip::{DataValue, GooseUpdate, JsonUpdateDecoder};

const CONFIG: &str = r#"
[[streams]]
sv_id = "MU01"

[[streams]]
sv_id = "MU02"

[rules]
ptrc = "IED1/PTRC1.Tr.general == true"
"#;

fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn bench() -> Result<TestBench> {
    let config: BenchConfig = CONFIG.parse()?;
    TestBench::new(config, Arc::new(NullTransport), Some(new_registry()))
}

#[test]
fn configured_streams_and_rules_are_registered() -> Result<()> {
    let bench = bench()?;
    let ids: Vec<String> = bench.list_streams().into_iter().map(|s| s.sv_id).collect();
    assert_eq!(ids, vec!["MU01", "MU02"]);
    assert_eq!(bench.list_rules().len(), 1);

    bench.update_data_point("IED1/PTRC1.Tr.general", DataValue::Bool(false));
    assert!(!bench.evaluate_and_signal().triggered);
    assert!(!bench.trip_signal().is_set());

    bench.update_data_point("IED1/PTRC1.Tr.general", DataValue::Bool(true));
    let result = bench.evaluate_and_signal();
    assert_eq!(result.rule_name.as_deref(), Some("ptrc"));
    assert!(bench.trip_signal().is_set());
    Ok(())
}

#[test]
fn invalid_rule_in_config_fails_construction() {
    let mut config = BenchConfig::default();
    config.rules.insert("broken".into(), "(A == true".into());
    let err = TestBench::new(config, Arc::new(NullTransport), None).unwrap_err();
    assert!(format!("{err:#}").contains("broken"));
}

#[test]
fn fault_phasors_land_on_the_stream() -> Result<()> {
    let bench = bench()?;
    let fault = FaultSpec {
        fault_type: FaultType::AG,
        fault_impedance: Impedance::new(0.0, 0.0),
        source: SourceImpedance::new(Impedance::new(1.0, 5.0), Impedance::new(3.0, 15.0), 63.5),
    };
    let state = bench.apply_fault("MU01", &fault)?;
    let status = bench.stream_status("MU01")?;
    assert_eq!(status.phasors, state.to_phasor_set());
    assert!(status.phasors.channel_or_zero(0).magnitude < 1e-6);
    assert!((status.phasors.channel_or_zero(1).magnitude - 63.5).abs() < 1e-9);
    assert!(bench.apply_fault("missing", &fault).is_err());
    Ok(())
}

#[test]
fn sampled_values_loop_back_into_the_analyzer() -> Result<()> {
    let config: BenchConfig = CONFIG.parse()?;
    let wire = Arc::new(LoopbackTransport::new());
    let registry = new_registry();
    let bench = TestBench::new(config, wire.clone(), Some(registry))?;

    bench.set_phasors("MU01", PhasorSet::balanced(63.5, 2.0, 30.0))?;
    bench.spawn_sv_monitor(wire)?;
    bench.select_analyzer_stream("MU01")?;
    bench.start_stream("MU01")?;

    let analysed = wait_until(Duration::from_secs(5), || {
        bench
            .latest_analysis()
            .and_then(|frame| frame.channel("Ia").map(|ia| ia.fundamental.magnitude))
            .is_some_and(|magnitude| (magnitude - 2.0).abs() < 0.05)
    });
    assert!(analysed, "{:?}", bench.latest_analysis());
    let frame = bench.latest_analysis().expect("analysis frame");
    let va = frame.channel("Va").expect("Va analysed");
    assert!((va.fundamental.magnitude - 63.5).abs() < 0.5, "{va:?}");
    assert!((va.frequency - 60.0).abs() < 1.0);

    let stats = bench.monitor_stats().expect("monitor running");
    assert!(stats.decoded > 0);
    assert_eq!(stats.errors, 0);
    assert!(bench.metrics_text()?.contains("r_prt_sv_frames_sent_total{stream=\"MU01\"}"));

    bench.shutdown();
    assert!(!bench.stream_status("MU01")?.running);
    assert!(!bench.analyzer_status().running);
    bench.shutdown();
    Ok(())
}

#[test]
fn goose_frames_raise_the_trip_signal() -> Result<()> {
    let bench = bench()?;
    let goose = Arc::new(LoopbackTransport::new());
    bench.spawn_goose_ingestor(goose.clone(), Arc::new(JsonUpdateDecoder))?;

    goose.inject(JsonUpdateDecoder::encode(&[GooseUpdate::new(
        "IED1/PTRC1.Tr.general",
        false,
    )]))?;
    thread::sleep(Duration::from_millis(100));
    assert!(!bench.trip_signal().is_set());

    goose.inject(JsonUpdateDecoder::encode(&[GooseUpdate::new(
        "IED1/PTRC1.Tr.general",
        true,
    )]))?;
    assert!(wait_until(Duration::from_secs(2), || bench.trip_signal().is_set()));
    assert_eq!(bench.goose_last_error(), None);
    Ok(())
}

#[test]
fn tester_factories_check_their_streams() -> Result<()> {
    let bench = bench()?;
    assert!(bench.ramping_tester("missing").is_err());

    let settings = DifferentialSettings {
        pickup_amps: 0.3,
        slope1_pct: 25.0,
        slope2_pct: 50.0,
        breakpoint_amps: 2.0,
        voltage: 63.5,
        timeout: Duration::from_millis(100),
    };
    assert!(bench
        .differential_tester("MU01", "missing", settings.clone())
        .is_err());
    let tester = bench.differential_tester("MU01", "MU02", settings)?;
    assert_eq!(tester.status(), TesterStatus::Idle);

    let ramp = bench.ramping_tester("MU01")?;
    assert_eq!(ramp.test().io().stream_id(), "MU01");
    Ok(())
}

#[test]
fn testers_follow_the_stream_nominal_frequency() -> Result<()> {
    let config: BenchConfig = r#"
[[streams]]
sv_id = "MU50"
nominal_frequency = 50.0
sample_rate = 4000
"#
    .parse()?;
    let bench = TestBench::new(config, Arc::new(NullTransport), None)?;
    let ramp = bench.ramping_tester("MU50")?;
    assert_eq!(ramp.test().io().frequency(), 50.0);
    Ok(())
}

#[test]
fn streams_can_be_added_after_construction() -> Result<()> {
    let bench = TestBench::new(BenchConfig::default(), Arc::new(NullTransport), None)?;
    assert!(bench.metrics_text().is_err());
    bench.create_stream(StreamConfig::new("MU09"))?;
    bench.start_stream("MU09")?;
    assert!(bench.stream_status("MU09")?.running);
    bench.stop_stream("MU09")?;
    bench.delete_stream("MU09")?;
    assert!(bench.list_streams().is_empty());
    Ok(())
}
