// corridor_core/src/estimation/filters/mod.rs

pub mod corridor_kf;

pub use corridor_kf::CorridorKalmanFilter;
