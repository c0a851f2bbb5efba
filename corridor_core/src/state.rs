// corridor_core/src/state.rs

use crate::types::{Covariance, SegmentIndex, State};
use nalgebra::{DMatrix, DVector};

/// Every variable that can appear in the corridor state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariable {
    /// Mainline density of a segment, vehicles per meter.
    Density(SegmentIndex),
    /// Density of the ramp attached to the downstream end of `segment`.
    RampDensity { slot: usize, segment: SegmentIndex },
}

/// The filter's estimate: state vector, its schema, covariance and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityState {
    /// The ordered "schema" of the state vector.
    pub layout: Vec<StateVariable>,
    /// Densities `x`: mainline segments first, then ramps.
    pub vector: State,
    /// The error covariance `P`.
    pub covariance: Covariance,
    /// The time, in seconds, this estimate describes.
    pub timestamp: f64,
}

impl DensityState {
    /// Zero densities with zero covariance.
    pub fn new(layout: Vec<StateVariable>, timestamp: f64) -> Self {
        let dim = layout.len();
        Self {
            layout,
            vector: DVector::zeros(dim),
            covariance: DMatrix::zeros(dim, dim),
            timestamp,
        }
    }

    pub fn dim(&self) -> usize {
        self.layout.len()
    }

    /// Number of mainline density entries at the head of the vector.
    pub fn n_mainline(&self) -> usize {
        self.layout
            .iter()
            .filter(|v| matches!(v, StateVariable::Density(_)))
            .count()
    }

    pub fn mainline_densities(&self) -> &[f64] {
        &self.vector.as_slice()[..self.n_mainline()]
    }

    pub fn ramp_densities(&self) -> &[f64] {
        &self.vector.as_slice()[self.n_mainline()..]
    }

    /// Vehicles on the mainline: Σ densityᵢ · lengthᵢ.
    pub fn total_vehicles(&self, lengths: impl IntoIterator<Item = f64>) -> f64 {
        self.mainline_densities()
            .iter()
            .zip(lengths)
            .map(|(rho, len)| rho * len)
            .sum()
    }

    /// Floors every density at zero. Returns how many entries were raised.
    pub fn clamp_non_negative(&mut self) -> usize {
        let mut clamped = 0;
        for v in self.vector.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
                clamped += 1;
            }
        }
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn layout() -> Vec<StateVariable> {
        vec![
            StateVariable::Density(0),
            StateVariable::Density(1),
            StateVariable::RampDensity { slot: 0, segment: 1 },
        ]
    }

    #[test]
    fn splits_mainline_and_ramp_entries() {
        let mut state = DensityState::new(layout(), 0.0);
        state.vector = DVector::from_vec(vec![0.01, 0.02, 0.003]);
        assert_eq!(state.n_mainline(), 2);
        assert_eq!(state.ramp_densities(), &[0.003]);
        assert_abs_diff_eq!(state.total_vehicles([100.0, 200.0]), 5.0);
    }

    #[test]
    fn clamp_floors_negative_densities() {
        let mut state = DensityState::new(layout(), 0.0);
        state.vector = DVector::from_vec(vec![-0.01, 0.02, -1e-9]);
        assert_eq!(state.clamp_non_negative(), 2);
        assert!(state.vector.iter().all(|v| *v >= 0.0));
    }
}
