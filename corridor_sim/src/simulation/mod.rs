// corridor_sim/src/simulation/mod.rs

pub mod config;
pub mod core;
pub mod recorded;
pub mod sources;
pub mod synthetic;
