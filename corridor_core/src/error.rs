// corridor_core/src/error.rs

use crate::types::SegmentIndex;
use thiserror::Error;

/// Every failure the estimation core can report.
///
/// Configuration errors are raised at construction time and mean the caller
/// never receives a usable estimator. The remaining variants are per-iteration
/// numeric failures; the estimator's state is left untouched when they occur.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    /// Malformed topology or calibration (conflicting ramp flags, zero-length
    /// segment, calibration tables of the wrong size, ...).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The innovation covariance `H·P·Hᵀ + R` could not be inverted.
    #[error("innovation covariance is singular (degenerate or duplicate measurement channels)")]
    SingularMeasurement,

    /// No observed, cached or default speed could be found for a segment.
    #[error("no usable speed for segment {segment}")]
    InsufficientData { segment: SegmentIndex },

    /// A vector or matrix handed to the estimator does not match the state layout.
    #[error("{what} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl EstimatorError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
