// corridor_sim/tests/synthetic_run.rs

use corridor_sim::prelude::*;
use std::path::Path;

const SCENARIO: &str = r#"
    [simulation]
    seed = 21
    start_time = 0.0
    end_time = 600.0
    timestep = 5.0

    [[road.waypoints]]
    x = 0.0
    y = 0.0
    [[road.waypoints]]
    x = 500.0
    y = 0.0
    [[road.waypoints]]
    x = 1000.0
    y = 0.0
    on_ramp = true
    [[road.waypoints]]
    x = 1500.0
    y = 0.0
    [[road.waypoints]]
    x = 2000.0
    y = 0.0
    off_ramp = true
    [[road.waypoints]]
    x = 2500.0
    y = 0.0

    [estimator]
    ramp_prior_density = 0.002
    default_speeds = [27.0, 26.0, 25.0, 24.0, 26.0]
    default_speed_variances = [16.0, 16.0, 16.0, 16.0, 16.0]
"#;

#[test]
fn estimator_tracks_synthetic_truth() {
    let scenario = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
    let summary = run_scenario(&scenario, None).unwrap();

    // 600 s at 5 s per step.
    assert_eq!(summary.iterations, 120);
    assert_eq!(summary.skipped_updates, 0);
    let rms = summary.rms_density_error.unwrap();
    assert!(rms.is_finite());
    assert!(rms < 0.02, "rms error {rms} too large");
    assert_eq!(summary.final_state.dim(), 5 + 2);
    assert!(summary.final_state.vector.iter().all(|v| *v >= 0.0));
    assert!((summary.final_state.timestamp - 600.0).abs() < 1e-9);
}

#[test]
fn seeded_runs_are_reproducible() {
    let scenario = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
    let a = run_scenario(&scenario, Some(3)).unwrap();
    let b = run_scenario(&scenario, Some(3)).unwrap();
    assert_eq!(a.rms_density_error, b.rms_density_error);
    assert_eq!(a.final_state.vector, b.final_state.vector);
}

#[test]
fn bundled_scenario_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scenarios/two_ramp_corridor.toml");
    let scenario = load_scenario(&path, None).unwrap();
    assert!(!scenario.data.is_recorded());
    let topology = scenario.road.build_topology().unwrap();
    assert_eq!(topology.n_segments(), 6);
    assert_eq!(topology.n_ramps(), 3);
    assert_eq!(scenario.estimator.default_speeds.len(), 6);
}

#[test]
fn invalid_timing_is_rejected() {
    let text = SCENARIO.replace("end_time = 600.0", "end_time = -1.0");
    let err = ScenarioConfig::from_toml_str(&text).unwrap_err();
    assert!(format!("{err:#}").contains("end_time"));
}

#[test]
fn runs_on_recorded_detectors_without_truth() {
    let dir = std::env::temp_dir().join(format!("corridor-run-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("pems")).unwrap();
    let export = "5 Minutes,Flow (Veh/5 Minutes),Speed (mph)\n\
        01/01/1970 00:00,150,60\n\
        01/01/1970 00:05,150,60\n\
        01/01/1970 00:10,150,60\n";
    std::fs::write(dir.join("pems/pems_vds_1.csv"), export).unwrap();
    std::fs::write(dir.join("pems/pems_vds_2.csv"), export).unwrap();
    std::fs::write(dir.join("pems/pems_vds_3.csv"), export).unwrap();

    let mut scenario = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
    scenario.simulation.end_time = 300.0;
    scenario.data = DataConfig {
        dir: Some(dir.clone()),
        pems_dir: Some("pems".into()),
        timezone: "UTC".into(),
        upstream_vds: Some(1),
        channel_vds: vec![2, 3],
        ..Default::default()
    };
    let summary = run_scenario(&scenario, None).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(summary.iterations, 60);
    assert!(summary.rms_density_error.is_none());
    assert!(summary.final_state.vector.iter().all(|v| v.is_finite() && *v >= 0.0));
}
