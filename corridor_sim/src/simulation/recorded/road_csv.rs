// corridor_sim/src/simulation/recorded/road_csv.rs

//! Road sections exported as CSV: one row per waypoint with `lat`, `long`,
//! `on_ramp`, `off_ramp` and an optional `vds_id` column. Other columns are
//! ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::DataError;
use crate::simulation::config::WaypointConfig;

#[derive(Debug, Deserialize)]
struct RoadRow {
    lat: f64,
    long: f64,
    #[serde(default)]
    on_ramp: Option<f64>,
    #[serde(default)]
    off_ramp: Option<f64>,
    #[serde(default)]
    vds_id: Option<f64>,
}

/// A flag column counts as set only when it holds 1.
fn flag(value: Option<f64>) -> bool {
    value == Some(1.0)
}

pub fn read_road_from(reader: impl Read, origin: &str) -> Result<Vec<WaypointConfig>, DataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    reader
        .deserialize::<RoadRow>()
        .map(|row| {
            let row = row.map_err(|source| DataError::Csv {
                origin: origin.to_string(),
                source,
            })?;
            Ok(WaypointConfig {
                lat: Some(row.lat),
                long: Some(row.long),
                on_ramp: flag(row.on_ramp),
                off_ramp: flag(row.off_ramp),
                vds_id: row.vds_id.filter(|id| id.is_finite() && *id >= 0.0).map(|id| id as u64),
                ..Default::default()
            })
        })
        .collect()
}

pub fn read_road_csv(path: &Path) -> Result<Vec<WaypointConfig>, DataError> {
    let origin = path.display().to_string();
    let file = File::open(path).map_err(|source| DataError::Io {
        origin: origin.clone(),
        source,
    })?;
    read_road_from(file, &origin)
}
