// corridor_core/src/lib.rs

// This file defines the public modules of the library.
pub mod config;
pub mod error;
pub mod estimation;
pub mod models;
pub mod prelude;
pub mod road;
pub mod speed_cache;
pub mod state;
pub mod types;
