// corridor_core/src/config.rs

//! Calibration constants for one corridor.
//!
//! Every corridor carries its own `EstimatorConfig`, so several estimators with
//! different calibrations can run side by side.

use crate::error::{EstimatorError, Result};
use crate::models::measurement::MeasurementChannel;
use crate::road::RoadTopology;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EstimatorConfig {
    /// Representative mainline density (veh/m). Scales the prior and the
    /// speed-driven process noise.
    pub typical_density: f64,
    /// Prior density assigned to every ramp state (veh/m).
    pub ramp_prior_density: f64,
    /// Variance of a GPS-derived average speed, (m/s)².
    pub gps_speed_variance: f64,
    /// Standard deviation of mainline density drift per second.
    pub density_process_std: f64,
    /// Standard deviation of ramp density drift per second.
    pub ramp_process_std: f64,
    /// Oldest cached speed, in steps, still used in place of a missing probe speed.
    pub max_age_use_prev_speed: u32,
    /// Probe speeds above this (m/s) are treated as "no observation".
    pub max_plausible_speed: f64,
    /// Per-segment speed (m/s) used when neither an observation nor a valid cached value exists.
    pub default_speeds: Vec<f64>,
    /// Per-segment variance of `default_speeds`, (m/s)².
    pub default_speed_variances: Vec<f64>,
    /// Measurement noise of each monitored ramp channel in the default layout.
    pub ramp_measurement_variance: f64,
    /// Measurement noise of the corridor outflow channel in the default layout.
    pub outflow_measurement_variance: f64,
    /// Explicit detector channel layout. When absent, every ramp but the last
    /// is monitored, plus the corridor outflow.
    pub measurement_channels: Option<Vec<MeasurementChannel>>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            typical_density: 0.04,
            ramp_prior_density: 0.01,
            gps_speed_variance: 9.0,
            density_process_std: 1e-4,
            ramp_process_std: 1e-4,
            max_age_use_prev_speed: 10,
            max_plausible_speed: 40.0,
            default_speeds: Vec::new(),
            default_speed_variances: Vec::new(),
            ramp_measurement_variance: 4e-6,
            outflow_measurement_variance: 4e-6,
            measurement_channels: None,
        }
    }
}

impl EstimatorConfig {
    /// Fills the per-segment default tables with the same speed everywhere.
    pub fn with_uniform_defaults(mut self, n_segments: usize, speed: f64, variance: f64) -> Self {
        self.default_speeds = vec![speed; n_segments];
        self.default_speed_variances = vec![variance; n_segments];
        self
    }

    /// Checks the calibration against the corridor it will be used on.
    pub fn validate(&self, topology: &RoadTopology) -> Result<()> {
        let n = topology.n_segments();
        for (name, table) in [
            ("default_speeds", &self.default_speeds),
            ("default_speed_variances", &self.default_speed_variances),
        ] {
            if table.len() != n {
                return Err(EstimatorError::config(format!(
                    "{name} has {} entries, the corridor has {n} segments",
                    table.len()
                )));
            }
        }
        if let Some(seg) = self.default_speeds.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(EstimatorError::config(format!(
                "default speed for segment {seg} must be a finite non-negative value"
            )));
        }

        let scalars = [
            ("typical_density", self.typical_density),
            ("ramp_prior_density", self.ramp_prior_density),
            ("gps_speed_variance", self.gps_speed_variance),
            ("density_process_std", self.density_process_std),
            ("ramp_process_std", self.ramp_process_std),
            ("ramp_measurement_variance", self.ramp_measurement_variance),
            ("outflow_measurement_variance", self.outflow_measurement_variance),
        ];
        let variances = self.default_speed_variances.iter().map(|v| ("default_speed_variances", *v));
        if let Some((name, value)) = scalars
            .into_iter()
            .chain(variances)
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(EstimatorError::config(format!(
                "{name} must be finite and non-negative, got {value}"
            )));
        }
        if !(self.max_plausible_speed > 0.0) {
            return Err(EstimatorError::config("max_plausible_speed must be positive"));
        }
        if let Some(seg) = self.default_speeds.iter().position(|v| *v > self.max_plausible_speed) {
            return Err(EstimatorError::config(format!(
                "default speed {} for segment {seg} exceeds max_plausible_speed {}",
                self.default_speeds[seg], self.max_plausible_speed
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::Waypoint;

    fn topology() -> RoadTopology {
        RoadTopology::from_waypoints(&[
            Waypoint::new(0.0, 0.0),
            Waypoint::new(500.0, 0.0),
            Waypoint::new(1000.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn default_tables_must_cover_every_segment() {
        let topo = topology();
        assert!(EstimatorConfig::default().validate(&topo).is_err());
        let cfg = EstimatorConfig::default().with_uniform_defaults(2, 25.0, 16.0);
        assert!(cfg.validate(&topo).is_ok());
    }

    #[test]
    fn default_speeds_must_be_plausible() {
        let mut cfg = EstimatorConfig::default().with_uniform_defaults(2, 25.0, 16.0);
        cfg.default_speeds[0] = cfg.max_plausible_speed + 1.0;
        let err = cfg.validate(&topology()).unwrap_err();
        assert!(err.to_string().contains("exceeds max_plausible_speed"));
    }

    #[test]
    fn negative_variances_are_rejected() {
        let mut cfg = EstimatorConfig::default().with_uniform_defaults(2, 25.0, 16.0);
        cfg.default_speed_variances[1] = -1.0;
        let err = cfg.validate(&topology()).unwrap_err();
        assert!(err.to_string().contains("default_speed_variances"));
    }
}
