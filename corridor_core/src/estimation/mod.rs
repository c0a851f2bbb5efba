// corridor_core/src/estimation/mod.rs

use crate::error::Result;
use crate::state::DensityState;
use crate::types::{DensityObservation, SegmentSpeeds, TimeWindow};
use nalgebra::DVector;

/// Supplies aggregated probe speeds. Implemented outside the core (e.g. by a
/// GPS-trace aggregator); the estimator never sees raw traces.
pub trait ProbeSource {
    /// Average speed per segment over `window`. Segments without coverage are absent.
    fn average_speeds(&self, window: TimeWindow) -> SegmentSpeeds;
}

/// Supplies stationary detector data at a given time.
pub trait DetectorSource {
    /// Flow (veh/s) entering the corridor upstream of segment 0.
    fn upstream_flow(&self, time: f64) -> Option<f64>;

    /// The measurement vector `z`, aligned with the estimator's channel order.
    fn measurement(&self, time: f64) -> Option<DVector<f64>>;

    /// A sparse density measurement used once to initialize the state.
    fn initial_densities(&self, time: f64) -> Option<Vec<DensityObservation>> {
        let _ = time;
        None
    }
}

/// The contract for any algorithm that performs the "State Estimator" role
/// for a corridor.
pub trait StateEstimator: Send + Sync {
    /// Runs one predict/update cycle, pulling data from the collaborators.
    /// This is the only externally driven state transition.
    fn run_iteration(&mut self, probes: &dyn ProbeSource, detectors: &dyn DetectorSource) -> Result<()>;

    /// Returns a reference to the current best estimate of the state.
    fn get_state(&self) -> &DensityState;

    /// The time cursor: end of the next prediction window.
    fn time(&self) -> f64;
}

pub mod filters;
pub mod kf;
