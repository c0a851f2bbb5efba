// corridor_sim/src/lib.rs

// This prelude is for convenience for other files WITHIN the corridor_sim crate.
pub mod prelude;

// Command-line arguments shared by the binary.
pub mod cli;
// Scenario loading, data sources, synthetic data and the run loop.
pub mod simulation;
