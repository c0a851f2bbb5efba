// corridor_sim/src/prelude.rs

// Re-export the corridor_core prelude so the estimator types are at hand.
pub use corridor_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::simulation::config::{load_scenario, DataConfig, ScenarioConfig, ScenarioError};
pub use crate::simulation::core::prng::SimulationRng;
pub use crate::simulation::core::runner::{run_scenario, RunSummary};
pub use crate::simulation::recorded::{load_recorded, DataError, RecordedData};
pub use crate::simulation::sources::{
    derive_probe_records, DetectorBank, DetectorReading, DetectorSeries, GpsFix, ProbeAssignment, ProbeLog,
    ProbeRecord,
};
pub use crate::simulation::synthetic::{GroundTruth, SyntheticRun};
