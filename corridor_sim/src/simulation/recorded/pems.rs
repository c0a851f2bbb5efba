// corridor_sim/src/simulation/recorded/pems.rs

//! PeMS vehicle detector station (VDS) exports, one `pems_vds_<id>.csv` per
//! station with 5-minute aggregates.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;

use super::DataError;
use crate::simulation::sources::{DetectorReading, DetectorSeries};

/// Length of one PeMS aggregation interval, seconds.
pub const PEMS_SAMPLE_PERIOD: f64 = 300.0;
pub const MPH_TO_MPS: f64 = 0.44704;
const PEMS_TIME_FORMAT: &str = "%m/%d/%Y %H:%M";

#[derive(Debug, Deserialize)]
struct PemsRow {
    #[serde(rename = "5 Minutes")]
    time: String,
    #[serde(rename = "Flow (Veh/5 Minutes)")]
    flow: Option<f64>,
    #[serde(rename = "Speed (mph)")]
    speed: Option<f64>,
}

/// One station's series in SI units.
#[derive(Debug, Clone)]
pub struct PemsStation {
    pub vds_id: u64,
    /// Vehicles per second.
    pub flow: DetectorSeries,
    /// Meters per second.
    pub speed: DetectorSeries,
    /// `flow / speed`, vehicles per meter, where both are known and speed is positive.
    pub density: DetectorSeries,
}

pub fn station_path(dir: &Path, vds_id: u64) -> PathBuf {
    dir.join(format!("pems_vds_{vds_id}.csv"))
}

/// Converts a PeMS local timestamp (`MM/DD/YYYY HH:MM`) to unix seconds.
/// Times repeated by a DST change resolve to the earlier instant.
pub fn parse_pems_time(text: &str, tz: Tz) -> Result<f64, String> {
    let naive = NaiveDateTime::parse_from_str(text, PEMS_TIME_FORMAT).map_err(|e| e.to_string())?;
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("{text} does not exist in {}", tz.name()))?;
    Ok(local.timestamp() as f64)
}

pub fn read_station_from(reader: impl Read, vds_id: u64, tz: Tz, origin: &str) -> Result<PemsStation, DataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let (mut flow, mut speed, mut density) = (Vec::new(), Vec::new(), Vec::new());

    for row in reader.deserialize::<PemsRow>() {
        let row = row.map_err(|source| DataError::Csv {
            origin: origin.to_string(),
            source,
        })?;
        let time = parse_pems_time(&row.time, tz).map_err(|reason| DataError::Time {
            origin: origin.to_string(),
            value: row.time.clone(),
            reason,
        })?;

        let q = row.flow.map(|f| f / PEMS_SAMPLE_PERIOD);
        let v = row.speed.map(|s| s * MPH_TO_MPS);
        if let Some(value) = q {
            flow.push(DetectorReading { time, value });
        }
        if let Some(value) = v {
            speed.push(DetectorReading { time, value });
        }
        if let (Some(q), Some(v)) = (q, v) {
            if v > 0.0 {
                density.push(DetectorReading { time, value: q / v });
            }
        }
    }

    Ok(PemsStation {
        vds_id,
        flow: DetectorSeries::new(format!("vds-{vds_id}-flow"), flow),
        speed: DetectorSeries::new(format!("vds-{vds_id}-speed"), speed),
        density: DetectorSeries::new(format!("vds-{vds_id}-density"), density),
    })
}

pub fn read_station(dir: &Path, vds_id: u64, tz: Tz) -> Result<PemsStation, DataError> {
    let path = station_path(dir, vds_id);
    let origin = path.display().to_string();
    let file = File::open(&path).map_err(|source| DataError::Io {
        origin: origin.clone(),
        source,
    })?;
    read_station_from(file, vds_id, tz, &origin)
}
