// corridor_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::estimation::{DetectorSource, ProbeSource, StateEstimator};
pub use crate::models::measurement::Measurement;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::road::{RampKind, RoadTopology, Segment, Waypoint};
pub use crate::speed_cache::{SpeedCache, SpeedResolution, SpeedSource};
pub use crate::state::{DensityState, StateVariable};
pub use crate::types::{DensityObservation, SegmentIndex, SegmentSpeeds, TimeWindow};

// --- Configuration and Errors ---
pub use crate::config::EstimatorConfig;
pub use crate::error::EstimatorError;

// --- Estimation Algorithms ---
pub use crate::estimation::filters::CorridorKalmanFilter;
pub use crate::estimation::kf::{kf_predict, kf_update, KfMeasurementParams, KfPredictParams};

// --- Concrete Model Implementations ---
pub use crate::models::conservation::ConservationDynamics;
pub use crate::models::measurement::{DetectorMeasurementModel, MeasurementChannel};
