// corridor_core/src/models/conservation.rs

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, Result};
use crate::road::RoadTopology;
use crate::types::Control;
use nalgebra::{DMatrix, DVector};
use tracing::trace;

/// First-order upwind discretization of vehicle conservation along the corridor.
///
/// Density flux out of segment `i` is `speedᵢ · densityᵢ`, so over one step
///
/// ```text
/// ρᵢ ← (1 − Δt/Lᵢ · vᵢ) · ρᵢ + Δt/Lᵢ · vᵢ₋₁ · ρᵢ₋₁
/// ```
///
/// The speeds change every step, so only the mainline block of the transition
/// matrix is rebuilt; the ramp coupling is copied from the topology template.
#[derive(Debug, Clone)]
pub struct ConservationDynamics {
    timestep: f64,
    n_segments: usize,
    /// `Δt / Lᵢ` for every segment.
    flux_gain: DVector<f64>,
    /// Ramp coupling pattern, `n_states × n_states`.
    template: DMatrix<f64>,
    /// Maps the upstream boundary flow into the first segment, `n_states × 1`.
    input_coupling: DMatrix<f64>,
    /// Process noise diagonal when every speed was observed or cached.
    base_process_noise: DVector<f64>,
    /// `(Δt / Lᵢ · typical_density)²`: how speed variance turns into density variance.
    speed_noise_gain: DVector<f64>,
    default_speed_variances: DVector<f64>,
}

impl ConservationDynamics {
    pub fn new(topology: &RoadTopology, config: &EstimatorConfig, timestep: f64) -> Result<Self> {
        if !timestep.is_finite() || timestep <= 0.0 {
            return Err(EstimatorError::config(format!(
                "timestep must be positive, got {timestep}"
            )));
        }
        let n_segments = topology.n_segments();
        let n_states = topology.n_states();
        if config.default_speed_variances.len() != n_segments {
            return Err(EstimatorError::DimensionMismatch {
                what: "default_speed_variances",
                expected: n_segments,
                actual: config.default_speed_variances.len(),
            });
        }

        let flux_gain = DVector::from_iterator(n_segments, topology.lengths().map(|l| timestep / l));
        // Any plausible speed must leave a non-negative retention term (CFL).
        if let Some(segment) = flux_gain.iter().position(|g| g * config.max_plausible_speed > 1.0) {
            return Err(EstimatorError::config(format!(
                "timestep {timestep} s is too long for segment {segment} ({:.1} m): \
                 a vehicle at max_plausible_speed {} m/s would cross it within one step",
                timestep / flux_gain[segment],
                config.max_plausible_speed
            )));
        }
        let speed_noise_gain = flux_gain.map(|g| (g * config.typical_density).powi(2));

        let mut input_coupling = DMatrix::zeros(n_states, 1);
        input_coupling[(0, 0)] = flux_gain[0];

        let density_var = (config.density_process_std * timestep).powi(2);
        let ramp_var = (config.ramp_process_std * timestep).powi(2);
        let base_process_noise = DVector::from_fn(n_states, |i, _| {
            if i < n_segments {
                // Both the inflow and the outflow leg carry probe noise, except
                // on the first segment whose inflow is the boundary detector.
                let legs = if i == 0 { 1.0 } else { 2.0 };
                legs * config.gps_speed_variance * speed_noise_gain[i] + density_var
            } else {
                ramp_var
            }
        });

        Ok(Self {
            timestep,
            n_segments,
            flux_gain,
            template: topology.topology_template().clone(),
            input_coupling,
            base_process_noise,
            speed_noise_gain,
            default_speed_variances: DVector::from_column_slice(&config.default_speed_variances),
        })
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn n_states(&self) -> usize {
        self.template.nrows()
    }

    /// Builds `A` for one step from the speed used on every segment.
    ///
    /// A speed that would carry more than a segment's content out within one
    /// step is capped at `Lᵢ / Δt`, so every retention term stays in `[0, 1]`
    /// and the mainline block never creates vehicles.
    pub fn transition_matrix(&self, speeds: &[f64]) -> Result<DMatrix<f64>> {
        if speeds.len() != self.n_segments {
            return Err(EstimatorError::DimensionMismatch {
                what: "segment speeds",
                expected: self.n_segments,
                actual: speeds.len(),
            });
        }
        if let Some(segment) = speeds.iter().position(|v| !v.is_finite()) {
            return Err(EstimatorError::InsufficientData { segment });
        }

        let courant: Vec<f64> = speeds
            .iter()
            .zip(self.flux_gain.iter())
            .enumerate()
            .map(|(i, (v, g))| {
                let c = g * v.max(0.0);
                if c > 1.0 {
                    trace!(segment = i, speed = v, "Speed exceeds one segment per step; capped");
                }
                c.min(1.0)
            })
            .collect();

        let mut a = self.template.clone();
        for i in 0..self.n_segments {
            a[(i, i)] = 1.0 - courant[i];
            if i > 0 {
                // Flux out of i−1 (veh/step) spread over segment i.
                a[(i, i - 1)] = courant[i - 1] * self.flux_gain[i] / self.flux_gain[i - 1];
            }
        }
        Ok(a)
    }

    pub fn input_coupling(&self) -> &DMatrix<f64> {
        &self.input_coupling
    }

    /// The control vector `u` for an upstream boundary flow (veh/s).
    pub fn control(&self, upstream_flow: f64) -> Control {
        Control::from_element(1, upstream_flow)
    }

    pub fn base_process_noise(&self) -> &DVector<f64> {
        &self.base_process_noise
    }

    /// `Q` for one step. Segments that ran on a default speed get an extra
    /// `(Δt/Lᵢ · typical_density)² · default_varianceᵢ`.
    pub fn process_noise(&self, used_default: &[bool]) -> Result<DMatrix<f64>> {
        if used_default.len() != self.n_segments {
            return Err(EstimatorError::DimensionMismatch {
                what: "default-speed mask",
                expected: self.n_segments,
                actual: used_default.len(),
            });
        }
        let mut diag = self.base_process_noise.clone();
        for (i, _) in used_default.iter().enumerate().filter(|(_, d)| **d) {
            diag[i] += self.speed_noise_gain[i] * self.default_speed_variances[i];
        }
        Ok(DMatrix::from_diagonal(&diag))
    }
}
