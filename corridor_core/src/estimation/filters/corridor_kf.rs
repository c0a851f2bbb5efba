// corridor_core/src/estimation/filters/corridor_kf.rs

use std::sync::Arc;

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, Result};
use crate::estimation::kf::{kf_predict, kf_update, KfMeasurementParams, KfPredictParams};
use crate::estimation::{DetectorSource, ProbeSource, StateEstimator};
use crate::models::conservation::ConservationDynamics;
use crate::models::measurement::DetectorMeasurementModel;
use crate::road::RoadTopology;
use crate::speed_cache::{resolve_speeds, SpeedCache, SpeedResolution, SpeedSource};
use crate::state::DensityState;
use crate::types::{DensityObservation, SegmentSpeeds, State, TimeWindow};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

/// A linear Kalman filter over corridor densities whose transition and process
/// noise are rebuilt every step from the current probe speeds.
#[derive(Debug, Clone)]
pub struct CorridorKalmanFilter {
    topology: Arc<RoadTopology>,
    config: EstimatorConfig,
    /// The current estimate (x, P and the time it describes).
    state: DensityState,
    /// End of the next prediction window.
    time: f64,
    dynamics: ConservationDynamics,
    measurement_model: DetectorMeasurementModel,
    speed_cache: SpeedCache,
    /// Speeds actually used by the last prediction.
    last_speeds: Option<SpeedResolution>,
}

impl CorridorKalmanFilter {
    /// Creates a filter whose state describes `start_time`.
    ///
    /// `initial` is a sparse density measurement; without one every density
    /// starts at zero. The time cursor is placed one step after `start_time`.
    pub fn new(
        topology: Arc<RoadTopology>,
        config: EstimatorConfig,
        timestep: f64,
        start_time: f64,
        initial: Option<&[DensityObservation]>,
    ) -> Result<Self> {
        config.validate(&topology)?;
        let dynamics = ConservationDynamics::new(&topology, &config, timestep)?;
        let measurement_model = DetectorMeasurementModel::from_config(&topology, &config)?;

        let mut state = DensityState::new(topology.state_layout(), start_time);
        state.vector = initial_densities(&topology, initial, config.ramp_prior_density)?;
        state.covariance = initial_covariance(&topology, &config);

        debug!(
            segments = topology.n_segments(),
            ramps = topology.n_ramps(),
            channels = measurement_model.dim(),
            "Corridor filter initialized."
        );

        Ok(Self {
            speed_cache: SpeedCache::new(topology.n_segments()),
            topology,
            config,
            state,
            time: start_time + timestep,
            dynamics,
            measurement_model,
            last_speeds: None,
        })
    }

    /// Like [`new`](Self::new), asking the detectors for the initial densities.
    pub fn from_detectors(
        topology: Arc<RoadTopology>,
        config: EstimatorConfig,
        timestep: f64,
        start_time: f64,
        detectors: &dyn DetectorSource,
    ) -> Result<Self> {
        let initial = detectors.initial_densities(start_time);
        if initial.is_none() {
            debug!("No initial density measurement; starting from an empty corridor.");
        }
        Self::new(topology, config, timestep, start_time, initial.as_deref())
    }

    /// Advances the state one step across the window that just elapsed.
    ///
    /// `segment_speeds` must already be free of implausible values. Missing
    /// segments are filled from the speed cache or the default table. Nothing
    /// is mutated if this returns an error.
    pub fn predict(&mut self, segment_speeds: &SegmentSpeeds, upstream_flow: f64) -> Result<()> {
        let observed = segment_speeds.to_dense(self.topology.n_segments());
        let resolution = resolve_speeds(
            &observed,
            &self.speed_cache,
            self.config.max_age_use_prev_speed,
            &self.config.default_speeds,
        )?;
        debug!(
            time = self.time,
            observed = resolution.count(SpeedSource::Observed),
            cached = resolution.count(SpeedSource::Cached),
            defaulted = resolution.count(SpeedSource::Default),
            "Resolved segment speeds."
        );

        let transition = self.dynamics.transition_matrix(&resolution.speeds)?;
        let process_noise_q = self.dynamics.process_noise(&resolution.used_default())?;
        let control = self.dynamics.control(upstream_flow);
        let predicted = kf_predict(
            &self.state,
            &KfPredictParams {
                transition: &transition,
                input_coupling: self.dynamics.input_coupling(),
                control: &control,
                process_noise_q: &process_noise_q,
                timestamp: self.time,
            },
        );

        self.state = predicted;
        self.time += self.dynamics.timestep();
        self.speed_cache.update(segment_speeds);
        self.last_speeds = Some(resolution);
        Ok(())
    }

    /// Corrects the state with a detector measurement vector.
    /// Nothing is mutated if this returns an error.
    pub fn update(&mut self, z: &DVector<f64>) -> Result<()> {
        let corrected = kf_update(
            &self.state,
            &KfMeasurementParams {
                model: &self.measurement_model,
                z,
            },
        )?;
        self.state = corrected;
        Ok(())
    }

    pub fn topology(&self) -> &RoadTopology {
        &self.topology
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn dynamics(&self) -> &ConservationDynamics {
        &self.dynamics
    }

    pub fn measurement_model(&self) -> &DetectorMeasurementModel {
        &self.measurement_model
    }

    pub fn speed_cache(&self) -> &SpeedCache {
        &self.speed_cache
    }

    /// The speeds and their provenance used by the most recent prediction.
    pub fn last_speeds(&self) -> Option<&SpeedResolution> {
        self.last_speeds.as_ref()
    }

    /// Vehicles currently on the mainline, according to the estimate.
    pub fn total_vehicles(&self) -> f64 {
        self.state.total_vehicles(self.topology.lengths())
    }
}

impl StateEstimator for CorridorKalmanFilter {
    fn run_iteration(&mut self, probes: &dyn ProbeSource, detectors: &dyn DetectorSource) -> Result<()> {
        let window_end = self.time;
        let window = TimeWindow::new(window_end - self.dynamics.timestep() + 1.0, window_end);

        let mut speeds = probes.average_speeds(window);
        let dropped = speeds.retain_plausible(self.config.max_plausible_speed);
        if dropped > 0 {
            debug!(dropped, "Ignored implausible probe speeds.");
        }

        let upstream_flow = detectors.upstream_flow(window_end).unwrap_or_else(|| {
            warn!(time = window_end, "No upstream flow available; assuming no inflow.");
            0.0
        });

        self.predict(&speeds, upstream_flow)?;

        // `predict` moved the cursor on; detectors are read at the new time.
        match detectors.measurement(self.time) {
            Some(z) => self.update(&z),
            None => {
                debug!(time = self.time, "No detector measurement; prediction only.");
                Ok(())
            }
        }
    }

    fn get_state(&self) -> &DensityState {
        &self.state
    }

    fn time(&self) -> f64 {
        self.time
    }
}

/// Spreads a sparse density measurement over the mainline.
///
/// Each measured value covers its own segment up to (not including) the next
/// measured segment; the last value extends to the final segment, and the
/// first one also covers any segments upstream of it. Ramps start at
/// `ramp_prior`. Without a measurement everything starts at zero.
fn initial_densities(
    topology: &RoadTopology,
    observations: Option<&[DensityObservation]>,
    ramp_prior: f64,
) -> Result<State> {
    let n_segments = topology.n_segments();
    let mut x = State::zeros(topology.n_states());
    let observations = match observations {
        Some(obs) if !obs.is_empty() => obs,
        _ => return Ok(x),
    };

    let mut sorted = observations.to_vec();
    sorted.sort_by_key(|o| o.segment);
    for (k, obs) in sorted.iter().enumerate() {
        if obs.segment >= n_segments {
            return Err(EstimatorError::config(format!(
                "initial density refers to segment {} but the corridor has {n_segments}",
                obs.segment
            )));
        }
        if !obs.density.is_finite() || obs.density < 0.0 {
            return Err(EstimatorError::config(format!(
                "initial density {} for segment {} is not a valid density",
                obs.density, obs.segment
            )));
        }
        if k > 0 && sorted[k - 1].segment == obs.segment {
            return Err(EstimatorError::config(format!(
                "segment {} has more than one initial density",
                obs.segment
            )));
        }
    }

    for (k, obs) in sorted.iter().enumerate() {
        let from = if k == 0 { 0 } else { obs.segment };
        let to = sorted.get(k + 1).map_or(n_segments, |next| next.segment);
        x.rows_mut(from, to - from).fill(obs.density);
    }
    x.rows_mut(n_segments, topology.n_ramps()).fill(ramp_prior);
    Ok(x)
}

/// Diagonal prior: `(typical_density/5)²` on the mainline, `(ramp_prior/2)²` on ramps.
fn initial_covariance(topology: &RoadTopology, config: &EstimatorConfig) -> DMatrix<f64> {
    let mainline_var = (config.typical_density / 5.0).powi(2);
    let ramp_var = (config.ramp_prior_density / 2.0).powi(2);
    let diag = DVector::from_fn(topology.n_states(), |i, _| {
        if i < topology.n_segments() {
            mainline_var
        } else {
            ramp_var
        }
    });
    DMatrix::from_diagonal(&diag)
}
