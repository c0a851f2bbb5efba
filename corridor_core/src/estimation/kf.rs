// corridor_core/src/estimation/kf.rs

use crate::error::{EstimatorError, Result};
use crate::models::measurement::Measurement;
use crate::state::DensityState;
use crate::types::Control;
use nalgebra::{DMatrix, DVector};
use tracing::trace;

/// A container for everything the prediction step needs.
pub struct KfPredictParams<'a> {
    pub transition: &'a DMatrix<f64>,
    pub input_coupling: &'a DMatrix<f64>,
    pub control: &'a Control,
    pub process_noise_q: &'a DMatrix<f64>,
    /// Time the predicted state describes: the end of the window `A` and `u` cover.
    pub timestamp: f64,
}

/// A container for everything the update step needs.
pub struct KfMeasurementParams<'a> {
    pub model: &'a dyn Measurement,
    pub z: &'a DVector<f64>,
}

/// PURE FUNCTION: Performs one linear prediction step.
/// Densities are floored at zero after `x ← A·x + B·u`.
pub fn kf_predict(current_state: &DensityState, params: &KfPredictParams) -> DensityState {
    let mut predicted = DensityState {
        layout: current_state.layout.clone(),
        vector: params.transition * &current_state.vector + params.input_coupling * params.control,
        covariance: params.transition * &current_state.covariance * params.transition.transpose()
            + params.process_noise_q,
        timestamp: params.timestamp,
    };

    let clamped = predicted.clamp_non_negative();
    if clamped > 0 {
        trace!(clamped, "Clipped negative densities after prediction.");
    }
    predicted
}

/// PURE FUNCTION: Performs one Kalman measurement update.
/// Returns the corrected state, or an error if the innovation covariance is singular.
pub fn kf_update(predicted_state: &DensityState, params: &KfMeasurementParams) -> Result<DensityState> {
    let h_matrix = params.model.h_matrix(predicted_state);
    if params.z.nrows() != h_matrix.nrows() {
        return Err(EstimatorError::DimensionMismatch {
            what: "measurement vector",
            expected: h_matrix.nrows(),
            actual: params.z.nrows(),
        });
    }
    let z_pred = params.model.predict_measurement(predicted_state);
    let r_matrix = params.model.get_r();

    let p_priori = &predicted_state.covariance;
    let y = params.z - z_pred; // Innovation
    let s = &h_matrix * p_priori * h_matrix.transpose() + r_matrix;
    let s_inv = s.try_inverse().ok_or(EstimatorError::SingularMeasurement)?;

    let k_gain = p_priori * h_matrix.transpose() * s_inv;
    let i_kh = DMatrix::<f64>::identity(predicted_state.dim(), predicted_state.dim()) - &k_gain * &h_matrix;

    let mut corrected = DensityState {
        layout: predicted_state.layout.clone(),
        vector: &predicted_state.vector + &k_gain * y,
        covariance: i_kh * p_priori,
        timestamp: predicted_state.timestamp,
    };
    let clamped = corrected.clamp_non_negative();
    if clamped > 0 {
        trace!(clamped, "Clipped negative densities after update.");
    }
    Ok(corrected)
}
