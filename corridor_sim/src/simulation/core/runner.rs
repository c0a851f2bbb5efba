// corridor_sim/src/simulation/core/runner.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use corridor_core::error::EstimatorError;
use corridor_core::estimation::filters::CorridorKalmanFilter;
use corridor_core::estimation::StateEstimator;
use corridor_core::state::DensityState;
use tracing::{info, warn};

use crate::simulation::config::ScenarioConfig;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::recorded;
use crate::simulation::sources::{derive_probe_records, ProbeLog};
use crate::simulation::synthetic;

/// What a finished run reports.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub iterations: usize,
    /// Iterations whose detector update was skipped because `S` was singular.
    pub skipped_updates: usize,
    /// RMS of mainline density error against the synthetic truth, veh/m.
    /// `None` for recorded data, which has no truth.
    pub rms_density_error: Option<f64>,
    pub final_vehicles: f64,
    pub final_state: DensityState,
}

/// Runs the estimator over the scenario's recorded data, or over a
/// generated synthetic corridor when the scenario names none.
///
/// `seed` overrides the scenario's seed. A singular innovation covariance is
/// logged and the run continues with the predicted state; any other estimator
/// error aborts the run.
pub fn run_scenario(scenario: &ScenarioConfig, seed: Option<u64>) -> Result<RunSummary> {
    scenario.validate()?;
    let sim = &scenario.simulation;
    let topology = Arc::new(scenario.road.build_topology()?);
    info!(
        segments = topology.n_segments(),
        ramps = topology.n_ramps(),
        "Corridor topology built."
    );

    let (fixes, detectors, truth) = if scenario.data.is_recorded() {
        info!("Using recorded corridor data.");
        let data = recorded::load_recorded(scenario, &topology)?;
        (data.fixes, data.detectors, None)
    } else {
        let mut rng = SimulationRng::from_seed(seed.or(sim.seed));
        let run = synthetic::generate(&topology, scenario, &mut rng)?;
        (run.fixes, run.detectors, Some(run.truth))
    };
    let probes = ProbeLog::new(derive_probe_records(&fixes, &topology, &scenario.probes));
    info!(fixes = fixes.len(), records = probes.len(), "Derived probe speeds.");
    if probes.is_empty() {
        warn!("No probe speeds; every prediction falls back to cached or default speeds.");
    }

    let mut filter = CorridorKalmanFilter::from_detectors(
        topology.clone(),
        scenario.estimator.clone(),
        sim.timestep,
        sim.start_time,
        &detectors,
    )
    .context("failed to initialize the estimator")?;

    let mut iterations = 0;
    let mut skipped_updates = 0;
    let mut squared_error = 0.0;
    let mut compared = 0usize;

    while filter.time() <= sim.end_time + 1e-9 {
        match filter.run_iteration(&probes, &detectors) {
            Ok(()) => {}
            Err(EstimatorError::SingularMeasurement) => {
                warn!(time = filter.get_state().timestamp, "Singular innovation covariance; keeping the prediction.");
                skipped_updates += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("estimator failed at t = {}", filter.get_state().timestamp));
            }
        }
        iterations += 1;

        // The state describes the end of the window it just consumed.
        let state = filter.get_state();
        if let Some(truth) = truth.as_deref().and_then(|t| synthetic::truth_at(t, state.timestamp)) {
            for (estimate, actual) in state.mainline_densities().iter().zip(truth.densities.iter()) {
                squared_error += (estimate - actual).powi(2);
                compared += 1;
            }
        }
        info!(
            time = state.timestamp,
            vehicles = filter.total_vehicles(),
            trace = state.covariance.trace(),
            "Iteration complete."
        );
    }

    let rms_density_error = (compared > 0).then(|| (squared_error / compared as f64).sqrt());

    Ok(RunSummary {
        iterations,
        skipped_updates,
        rms_density_error,
        final_vehicles: filter.total_vehicles(),
        final_state: filter.get_state().clone(),
    })
}
