// corridor_sim/src/simulation/synthetic.rs

//! A synthetic corridor: ground-truth densities propagated with the same
//! conservation model the estimator uses, observed through noisy GPS probes
//! and detectors.

use std::f64::consts::TAU;

use corridor_core::models::conservation::ConservationDynamics;
use corridor_core::models::measurement::{DetectorMeasurementModel, Measurement};
use corridor_core::road::RoadTopology;
use corridor_core::state::DensityState;
use corridor_core::types::DensityObservation;
use nalgebra::{DVector, Point2, Vector2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::simulation::config::{ScenarioConfig, ScenarioError};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::sources::{DetectorBank, DetectorReading, DetectorSeries, GpsFix};

/// The true mainline and ramp densities at one instant.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub time: f64,
    pub densities: DVector<f64>,
}

/// Everything one synthetic run produces.
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    /// Truth at the end of every step, in time order.
    pub truth: Vec<GroundTruth>,
    pub fixes: Vec<GpsFix>,
    pub detectors: DetectorBank,
}

impl SyntheticRun {
    pub fn truth_at(&self, time: f64) -> Option<&GroundTruth> {
        truth_at(&self.truth, time)
    }
}

/// Truth recorded at `time`, within a millisecond. `truth` must be time ordered.
pub fn truth_at(truth: &[GroundTruth], time: f64) -> Option<&GroundTruth> {
    let idx = truth.partition_point(|t| t.time < time - 1e-3);
    truth.get(idx).filter(|t| (t.time - time).abs() <= 1e-3)
}

fn normal(std: f64, what: &str) -> Result<Normal<f64>, ScenarioError> {
    Normal::new(0.0, std).map_err(|e| ScenarioError::Synthetic(format!("{what}: {e}")))
}

/// Generates truth, GPS fixes and detector readings over the scenario span.
pub fn generate(
    topology: &RoadTopology,
    scenario: &ScenarioConfig,
    rng: &mut SimulationRng,
) -> Result<SyntheticRun, ScenarioError> {
    let sim = &scenario.simulation;
    let cfg = &scenario.synthetic;
    let n_segments = topology.n_segments();
    let dt = sim.timestep;

    let base_speeds = cfg.true_speeds.as_ref().unwrap_or(&scenario.estimator.default_speeds);
    if base_speeds.len() != n_segments {
        return Err(ScenarioError::Synthetic(format!(
            "{} true speeds for {n_segments} segments",
            base_speeds.len()
        )));
    }
    if !(0.0..=1.0).contains(&cfg.probe_coverage) {
        return Err(ScenarioError::Synthetic(format!(
            "probe_coverage must lie in [0, 1], got {}",
            cfg.probe_coverage
        )));
    }
    if !(cfg.fix_interval > 0.0) || !(cfg.speed_period > 0.0) {
        return Err(ScenarioError::Synthetic(
            "fix_interval and speed_period must be positive".to_string(),
        ));
    }

    let gps_noise = normal(cfg.gps_position_std, "gps_position_std")?;
    let detector_noise = normal(cfg.detector_noise_std, "detector_noise_std")?;
    let flow_noise = normal(cfg.flow_noise_std, "flow_noise_std")?;

    let dynamics = ConservationDynamics::new(topology, &scenario.estimator, dt)?;
    let sensors = DetectorMeasurementModel::from_config(topology, &scenario.estimator)?;

    let mut truth = DensityState::new(topology.state_layout(), sim.start_time);
    for (i, value) in truth.vector.iter_mut().enumerate() {
        *value = if i < n_segments {
            cfg.initial_density
        } else {
            cfg.ramp_density
        };
    }

    let mut upstream = DetectorSeries::new("upstream", Vec::new());
    let mut channels: Vec<DetectorSeries> = sensors
        .channels()
        .iter()
        .enumerate()
        .map(|(i, _)| DetectorSeries::new(format!("channel-{i}"), Vec::new()))
        .collect();

    // Records noisy detector readings of the current truth. The estimator reads
    // detectors at its cursor, one step after the state it corrects, so channel
    // readings of the truth at `t` are reported at `t + dt`.
    let mut observe = |truth: &DensityState, rng: &mut SimulationRng| {
        upstream.push(DetectorReading {
            time: truth.timestamp,
            value: (cfg.upstream_flow + flow_noise.sample(&mut rng.0)).max(0.0),
        });
        let z = sensors.predict_measurement(truth);
        for (series, value) in channels.iter_mut().zip(z.iter()) {
            series.push(DetectorReading {
                time: truth.timestamp + dt,
                value: value + detector_noise.sample(&mut rng.0),
            });
        }
    };
    observe(&truth, &mut *rng);

    // Every other segment is measured at the start.
    let initial: Vec<DensityObservation> = (0..n_segments)
        .step_by(2)
        .map(|segment| DensityObservation {
            segment,
            density: (truth.vector[segment] + detector_noise.sample(&mut rng.0)).max(0.0),
        })
        .collect();

    let mut records = vec![GroundTruth {
        time: truth.timestamp,
        densities: truth.vector.clone(),
    }];
    let mut fixes = Vec::new();
    let mut next_vehicle = 0u64;

    while truth.timestamp + dt <= sim.end_time + 1e-9 {
        let window_end = truth.timestamp + dt;
        let phase = TAU * window_end / cfg.speed_period;
        let speeds: Vec<f64> = base_speeds
            .iter()
            .enumerate()
            .map(|(i, v)| (v * (1.0 + cfg.speed_variation * (phase + 0.7 * i as f64).sin())).max(0.0))
            .collect();

        let transition = dynamics.transition_matrix(&speeds)?;
        truth.vector = &transition * &truth.vector + dynamics.input_coupling() * dynamics.control(cfg.upstream_flow);
        truth.timestamp = window_end;
        truth.clamp_non_negative();

        records.push(GroundTruth {
            time: window_end,
            densities: truth.vector.clone(),
        });
        observe(&truth, &mut *rng);

        // Probe vehicles: two fixes each, the later one inside the window.
        for (segment, (seg, speed)) in topology.segments().iter().zip(&speeds).enumerate() {
            if !rng.0.gen_bool(cfg.probe_coverage) {
                continue;
            }
            let n_probes = rng.0.gen_range(1..=cfg.max_probes_per_segment.max(1));
            for _ in 0..n_probes {
                let t_late = window_end - rng.0.gen::<f64>() * (dt - 1.0).max(0.0);
                let along = rng.0.gen::<f64>() * seg.length;
                let at = |offset: f64, rng: &mut SimulationRng| -> Point2<f64> {
                    seg.start
                        + seg.direction() * offset
                        + Vector2::new(gps_noise.sample(&mut rng.0), gps_noise.sample(&mut rng.0))
                };
                let first = at(along, &mut *rng);
                let second = at(along + speed * cfg.fix_interval, &mut *rng);
                fixes.push(GpsFix {
                    vehicle_id: next_vehicle,
                    time: t_late - cfg.fix_interval,
                    position: first,
                });
                fixes.push(GpsFix {
                    vehicle_id: next_vehicle,
                    time: t_late,
                    position: second,
                });
                next_vehicle += 1;
            }
            debug!(segment, n_probes, "Generated probe vehicles.");
        }
    }

    debug!(
        steps = records.len() - 1,
        fixes = fixes.len(),
        "Synthetic corridor generated."
    );

    Ok(SyntheticRun {
        truth: records,
        fixes,
        detectors: DetectorBank::new(upstream, channels).with_initial_densities(initial),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use corridor_core::estimation::DetectorSource;

    const SCENARIO: &str = r#"
        [simulation]
        start_time = 0.0
        end_time = 100.0
        timestep = 5.0

        [[road.waypoints]]
        x = 0.0
        y = 0.0
        [[road.waypoints]]
        x = 500.0
        y = 0.0
        on_ramp = true
        [[road.waypoints]]
        x = 1000.0
        y = 0.0
        off_ramp = true
        [[road.waypoints]]
        x = 1500.0
        y = 0.0

        [estimator]
        default_speeds = [25.0, 25.0, 25.0]
        default_speed_variances = [16.0, 16.0, 16.0]
    "#;

    fn run(seed: u64) -> (RoadTopology, SyntheticRun) {
        let scenario = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        let topology = scenario.road.build_topology().unwrap();
        let mut rng = SimulationRng::from_seed(Some(seed));
        let run = generate(&topology, &scenario, &mut rng).unwrap();
        (topology, run)
    }

    #[test]
    fn produces_one_truth_per_step() {
        let (topology, run) = run(1);
        assert_eq!(run.truth.len(), 21);
        assert!(run.truth_at(50.0).is_some());
        assert!(run.truth_at(52.0).is_none());
        for t in &run.truth {
            assert_eq!(t.densities.len(), topology.n_states());
            assert!(t.densities.iter().all(|d| *d >= 0.0 && d.is_finite()));
        }
        // Default layout: first ramp plus outflow.
        assert_eq!(run.detectors.channels().len(), 2);
        assert_eq!(run.detectors.channels()[0].len(), 21);
    }

    #[test]
    fn channel_readings_are_reported_one_step_late() {
        let mut scenario = ScenarioConfig::from_toml_str(SCENARIO).unwrap();
        scenario.synthetic.detector_noise_std = 0.0;
        let topology = scenario.road.build_topology().unwrap();
        let run = generate(&topology, &scenario, &mut SimulationRng::from_seed(Some(2))).unwrap();

        // Channel 1 is the outflow of the last segment.
        let truth = run.truth_at(50.0).unwrap();
        let reported = run.detectors.channels()[1].value_at(55.0).unwrap();
        assert_eq!(reported, truth.densities[2]);
        assert!(run.detectors.upstream_flow(50.0).is_some());
    }

    #[test]
    fn same_seed_same_data() {
        let (_, a) = run(11);
        let (_, b) = run(11);
        assert_eq!(a.fixes, b.fixes);
        let (_, c) = run(12);
        assert_ne!(a.fixes, c.fixes);
    }

    #[test]
    fn fixes_come_in_pairs() {
        let (_, run) = run(5);
        assert_eq!(run.fixes.len() % 2, 0);
        for pair in run.fixes.chunks(2) {
            assert_eq!(pair[0].vehicle_id, pair[1].vehicle_id);
            assert!(pair[1].time > pair[0].time);
        }
    }
}
