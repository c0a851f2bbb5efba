// corridor_core/src/models/mod.rs

//! The physical and sensor models the corridor filter is built from.

pub mod conservation;
pub mod measurement;
