// corridor_sim/src/simulation/recorded/cabspotting.rs

//! Taxi GPS traces in the cabspotting layout: a `_cabs.txt` index of
//! `<cab id="..." updates="..."/>` entries and one `new_<id>.txt` trace per cab
//! with `lat long occupancy time` lines.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use corridor_core::road::geometry::{self, GeoPoint};
use corridor_core::types::TimeWindow;
use tracing::{debug, warn};

use super::DataError;
use crate::simulation::sources::GpsFix;

pub const CAB_INDEX_FILE: &str = "_cabs.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabEntry {
    pub id: String,
    pub updates: u64,
}

/// One raw trace line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CabFix {
    pub lat: f64,
    pub long: f64,
    pub occupied: bool,
    /// Unix seconds.
    pub time: f64,
}

fn tag_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(&format!("{key}=\""))? + key.len() + 2;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

/// Parses the cab index. Blank lines are skipped and lines that are not
/// `<cab .../>` tags are skipped with a warning.
pub fn parse_cab_list(text: &str, origin: &str) -> Result<Vec<CabEntry>, DataError> {
    let mut cabs = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with("<cab") {
            warn!(origin, line = number + 1, "Skipping unrecognized line in cab index.");
            continue;
        }
        let malformed = |reason: &str| DataError::Malformed {
            origin: origin.to_string(),
            line: number + 1,
            reason: reason.to_string(),
        };
        let id = tag_value(line, "id").ok_or_else(|| malformed("missing id attribute"))?;
        let updates = tag_value(line, "updates")
            .ok_or_else(|| malformed("missing updates attribute"))?
            .parse()
            .map_err(|_| malformed("updates is not a count"))?;
        cabs.push(CabEntry {
            id: id.to_string(),
            updates,
        });
    }
    Ok(cabs)
}

pub fn read_cab_trace_from(reader: impl Read, origin: &str) -> Result<Vec<CabFix>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .trim(csv::Trim::All)
        .from_reader(reader);

    reader
        .deserialize::<(f64, f64, u8, f64)>()
        .map(|row| {
            let (lat, long, occupancy, time) = row.map_err(|source| DataError::Csv {
                origin: origin.to_string(),
                source,
            })?;
            Ok(CabFix {
                lat,
                long,
                occupied: occupancy != 0,
                time,
            })
        })
        .collect()
}

/// Reads every listed cab's trace and projects the fixes about `center`.
///
/// Only fixes inside `window` are kept. A cab's `vehicle_id` is its position
/// in the index. Cabs whose trace file is missing are skipped with a warning.
pub fn load_fixes(dir: &Path, center: GeoPoint, window: TimeWindow) -> Result<Vec<GpsFix>, DataError> {
    let index_path = dir.join(CAB_INDEX_FILE);
    let origin = index_path.display().to_string();
    let text = fs::read_to_string(&index_path).map_err(|source| DataError::Io {
        origin: origin.clone(),
        source,
    })?;
    let cabs = parse_cab_list(&text, &origin)?;

    let mut fixes = Vec::new();
    for (vehicle_id, cab) in cabs.iter().enumerate() {
        let path = dir.join(format!("new_{}.txt", cab.id));
        let origin = path.display().to_string();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(cab = %cab.id, error = %e, "Cab trace unavailable; skipping.");
                continue;
            }
        };
        let before = fixes.len();
        fixes.extend(
            read_cab_trace_from(file, &origin)?
                .into_iter()
                .filter(|fix| window.contains(fix.time))
                .map(|fix| GpsFix {
                    vehicle_id: vehicle_id as u64,
                    time: fix.time,
                    position: geometry::project(
                        GeoPoint {
                            lat: fix.lat,
                            long: fix.long,
                        },
                        center,
                    ),
                }),
        );
        debug!(cab = %cab.id, kept = fixes.len() - before, listed = cab.updates, "Loaded cab trace.");
    }
    Ok(fixes)
}
