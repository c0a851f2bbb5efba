// corridor_sim/src/simulation/sources/mod.rs

//! Data collaborators handed to the estimator: detector time series and
//! probe speeds derived from GPS fixes.

pub mod detectors;
pub mod probes;

pub use detectors::{DetectorBank, DetectorReading, DetectorSeries};
pub use probes::{derive_probe_records, GpsFix, ProbeAssignment, ProbeLog, ProbeRecord};
