// corridor_core/src/models/measurement.rs

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, Result};
use crate::road::RoadTopology;
use crate::state::DensityState;
use crate::types::SegmentIndex;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

// --- MEASUREMENT MODEL TRAIT ---
// Represents the mathematical model of a sensor. `z = H·x + v`
pub trait Measurement: Debug + Send + Sync {
    /// Returns the measurement noise covariance matrix `R`.
    fn get_r(&self) -> &DMatrix<f64>;

    /// Predicts the ideal measurement `z_pred = H·x` from the filter state.
    fn predict_measurement(&self, filter_state: &DensityState) -> DVector<f64>;

    /// Returns the measurement matrix `H`.
    fn h_matrix(&self, filter_state: &DensityState) -> DMatrix<f64>;
}

/// One row of the detector measurement vector and the state it observes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementChannel {
    /// A detector on a mainline segment.
    Mainline { segment: SegmentIndex, variance: f64 },
    /// A detector on the ramp in the given ramp slot.
    Ramp { slot: usize, variance: f64 },
    /// Total corridor outflow, observed through the last mainline segment.
    Outflow { variance: f64 },
}

impl MeasurementChannel {
    pub fn variance(&self) -> f64 {
        match *self {
            Self::Mainline { variance, .. } | Self::Ramp { variance, .. } | Self::Outflow { variance } => {
                variance
            }
        }
    }

    fn state_index(&self, topology: &RoadTopology) -> Option<usize> {
        match *self {
            Self::Mainline { segment, .. } => (segment < topology.n_segments()).then_some(segment),
            Self::Ramp { slot, .. } => topology.ramp_state_index(slot),
            Self::Outflow { .. } => topology.n_segments().checked_sub(1),
        }
    }
}

/// Selects the detector-monitored states out of the corridor state.
///
/// `H` and `R` are fixed for the lifetime of the estimator.
#[derive(Debug, Clone)]
pub struct DetectorMeasurementModel {
    channels: Vec<MeasurementChannel>,
    h_matrix: DMatrix<f64>,
    r_matrix: DMatrix<f64>,
}

impl DetectorMeasurementModel {
    pub fn new(topology: &RoadTopology, channels: Vec<MeasurementChannel>) -> Result<Self> {
        if channels.is_empty() {
            return Err(EstimatorError::config("at least one measurement channel is required"));
        }
        let mut h_matrix = DMatrix::zeros(channels.len(), topology.n_states());
        for (row, channel) in channels.iter().enumerate() {
            let col = channel.state_index(topology).ok_or_else(|| {
                EstimatorError::config(format!(
                    "measurement channel {row} ({channel:?}) does not exist on this corridor"
                ))
            })?;
            let variance = channel.variance();
            if !variance.is_finite() || variance < 0.0 {
                return Err(EstimatorError::config(format!(
                    "measurement channel {row} has invalid variance {variance}"
                )));
            }
            h_matrix[(row, col)] = 1.0;
        }
        let r_diag = DVector::from_iterator(channels.len(), channels.iter().map(|c| c.variance()));

        Ok(Self {
            channels,
            h_matrix,
            r_matrix: DMatrix::from_diagonal(&r_diag),
        })
    }

    /// Uses the explicit layout from `config` when given, else the default one.
    pub fn from_config(topology: &RoadTopology, config: &EstimatorConfig) -> Result<Self> {
        let channels = config
            .measurement_channels
            .clone()
            .unwrap_or_else(|| Self::default_layout(topology, config));
        Self::new(topology, channels)
    }

    /// Every ramp except the most downstream one, then the corridor outflow.
    /// This gives `n_ramps` channels, or the single outflow channel when the
    /// corridor has no ramps.
    pub fn default_layout(topology: &RoadTopology, config: &EstimatorConfig) -> Vec<MeasurementChannel> {
        let monitored_ramps = topology.n_ramps().saturating_sub(1);
        (0..monitored_ramps)
            .map(|slot| MeasurementChannel::Ramp {
                slot,
                variance: config.ramp_measurement_variance,
            })
            .chain(std::iter::once(MeasurementChannel::Outflow {
                variance: config.outflow_measurement_variance,
            }))
            .collect()
    }

    pub fn channels(&self) -> &[MeasurementChannel] {
        &self.channels
    }

    pub fn dim(&self) -> usize {
        self.channels.len()
    }
}

impl Measurement for DetectorMeasurementModel {
    fn get_r(&self) -> &DMatrix<f64> {
        &self.r_matrix
    }

    fn predict_measurement(&self, filter_state: &DensityState) -> DVector<f64> {
        &self.h_matrix * &filter_state.vector
    }

    fn h_matrix(&self, _filter_state: &DensityState) -> DMatrix<f64> {
        self.h_matrix.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::Waypoint;

    fn two_ramp_corridor() -> RoadTopology {
        RoadTopology::from_waypoints(&[
            Waypoint::new(0.0, 0.0),
            Waypoint::new(300.0, 0.0).with_on_ramp(),
            Waypoint::new(600.0, 0.0),
            Waypoint::new(900.0, 0.0).with_off_ramp(),
        ])
        .unwrap()
    }

    #[test]
    fn default_layout_has_one_row_per_ramp() {
        let topo = two_ramp_corridor();
        let model = DetectorMeasurementModel::from_config(&topo, &EstimatorConfig::default()).unwrap();
        assert_eq!(model.dim(), topo.n_ramps());

        let state = DensityState::new(topo.state_layout(), 0.0);
        let h = model.h_matrix(&state);
        assert_eq!(h.shape(), (2, 5));
        // First on-ramp state, then the last mainline segment.
        assert_eq!(h[(0, 3)], 1.0);
        assert_eq!(h[(1, 2)], 1.0);
        assert_eq!(h.iter().filter(|v| **v != 0.0).count(), 2);
        assert_eq!(model.get_r()[(1, 1)], EstimatorConfig::default().outflow_measurement_variance);
    }

    #[test]
    fn corridor_without_ramps_still_observes_outflow() {
        let topo = RoadTopology::from_waypoints(&[Waypoint::new(0.0, 0.0), Waypoint::new(100.0, 0.0)])
            .unwrap();
        let model = DetectorMeasurementModel::from_config(&topo, &EstimatorConfig::default()).unwrap();
        assert_eq!(model.channels(), &[MeasurementChannel::Outflow { variance: 4e-6 }]);
    }

    #[test]
    fn unknown_ramp_slot_is_rejected() {
        let topo = two_ramp_corridor();
        let err = DetectorMeasurementModel::new(
            &topo,
            vec![MeasurementChannel::Ramp {
                slot: 2,
                variance: 1.0,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, EstimatorError::Configuration(_)));
    }
}
