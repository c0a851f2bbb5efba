// corridor_sim/src/simulation/recorded/mod.rs

//! Recorded corridor data: the road-section CSV, PeMS detector stations and
//! cabspotting taxi traces, turned into the same sources the synthetic
//! generator produces.

pub mod cabspotting;
pub mod pems;
pub mod road_csv;

use std::collections::BTreeMap;
use std::path::Path;

use chrono_tz::Tz;
use corridor_core::models::measurement::DetectorMeasurementModel;
use corridor_core::road::RoadTopology;
use corridor_core::types::{DensityObservation, TimeWindow};
use thiserror::Error;
use tracing::{info, warn};

use crate::simulation::config::{ScenarioConfig, ScenarioError};
use crate::simulation::sources::{DetectorBank, DetectorSeries, GpsFix};
use pems::PemsStation;

pub use road_csv::{read_road_csv, read_road_from};

/// Problems reading recorded data files.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("cannot read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },
    #[error("bad timestamp {value:?} in {origin}: {reason}")]
    Time { origin: String, value: String, reason: String },
    #[error("unknown time zone {0:?}")]
    TimeZone(String),
    #[error("{origin}:{line}: {reason}")]
    Malformed { origin: String, line: usize, reason: String },
    #[error("recorded data does not fit the corridor: {0}")]
    Layout(String),
}

/// Everything the estimator needs from a recorded day.
#[derive(Debug, Clone, Default)]
pub struct RecordedData {
    pub fixes: Vec<GpsFix>,
    pub detectors: DetectorBank,
}

fn station<'a>(
    cache: &'a mut BTreeMap<u64, PemsStation>,
    dir: &Path,
    vds_id: u64,
    tz: Tz,
) -> Result<&'a PemsStation, DataError> {
    if !cache.contains_key(&vds_id) {
        let loaded = pems::read_station(dir, vds_id, tz)?;
        info!(vds_id, readings = loaded.flow.len(), "Loaded detector station.");
        cache.insert(vds_id, loaded);
    }
    cache
        .get(&vds_id)
        .ok_or_else(|| DataError::Layout(format!("station {vds_id} vanished from the cache")))
}

/// Loads the recorded sources named by the scenario's `[data]` section.
///
/// Waypoints carrying a `vds_id` seed the initial densities of the segment
/// they start; the first station on a segment wins. `upstream_vds` supplies
/// the inflow and `channel_vds` one density series per measurement channel.
pub fn load_recorded(scenario: &ScenarioConfig, topology: &RoadTopology) -> Result<RecordedData, ScenarioError> {
    let data = &scenario.data;
    let sim = &scenario.simulation;
    let tz: Tz = data
        .timezone
        .parse()
        .map_err(|_| DataError::TimeZone(data.timezone.clone()))?;

    let detectors = match data.pems_path() {
        Some(dir) => {
            let dim = DetectorMeasurementModel::from_config(topology, &scenario.estimator)?.dim();
            if !data.channel_vds.is_empty() && data.channel_vds.len() != dim {
                return Err(DataError::Layout(format!(
                    "{} channel stations given for {dim} measurement channels",
                    data.channel_vds.len()
                ))
                .into());
            }
            if data.channel_vds.is_empty() {
                warn!("No channel stations configured; every step will be prediction only.");
            }

            let mut cache = BTreeMap::new();
            let upstream = match data.upstream_vds {
                Some(id) => station(&mut cache, &dir, id, tz)?.flow.clone(),
                None => {
                    warn!("No upstream station configured; inflow will be treated as zero.");
                    DetectorSeries::default()
                }
            };
            let channels = data
                .channel_vds
                .iter()
                .map(|&id| Ok(station(&mut cache, &dir, id, tz)?.density.clone()))
                .collect::<Result<Vec<_>, DataError>>()?;

            let last_segment = topology.n_segments().saturating_sub(1);
            let mut initial: Vec<DensityObservation> = Vec::new();
            for (row, waypoint) in scenario.road.waypoints.iter().enumerate() {
                let Some(id) = waypoint.vds_id else { continue };
                let segment = row.min(last_segment);
                if initial.iter().any(|o| o.segment == segment) {
                    continue;
                }
                let s = station(&mut cache, &dir, id, tz)?;
                match (s.flow.value_at(sim.start_time), s.speed.value_at(sim.start_time)) {
                    (Some(q), Some(v)) if v > 0.0 => initial.push(DensityObservation {
                        segment,
                        density: q / v,
                    }),
                    _ => warn!(vds_id = id, segment, "Station has no usable reading at the start time."),
                }
            }
            DetectorBank::new(upstream, channels).with_initial_densities(initial)
        }
        None => {
            warn!("No detector directory configured; running on probe speeds alone.");
            DetectorBank::default()
        }
    };

    let fixes = match data.cab_path() {
        Some(dir) if dir.is_dir() => {
            let center = scenario
                .road
                .geo_center()
                .ok_or_else(|| DataError::Layout("cab traces need lat/long waypoints".into()))?;
            let window = TimeWindow::new(sim.start_time - scenario.probes.max_fix_gap, sim.end_time);
            cabspotting::load_fixes(&dir, center, window)?
        }
        Some(dir) => {
            warn!(dir = %dir.display(), "Cab directory not found; running without probe vehicles.");
            Vec::new()
        }
        None => Vec::new(),
    };
    info!(fixes = fixes.len(), channels = detectors.channels().len(), "Recorded data loaded.");

    Ok(RecordedData { fixes, detectors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::{DataConfig, RoadConfig, WaypointConfig};
    use corridor_core::estimation::DetectorSource;
    use std::fs;

    fn scenario(dir: &Path) -> ScenarioConfig {
        let waypoint = |long: f64, vds_id: Option<u64>, on_ramp: bool| WaypointConfig {
            lat: Some(37.7),
            long: Some(long),
            on_ramp,
            vds_id,
            ..Default::default()
        };
        let mut scenario = ScenarioConfig {
            simulation: Default::default(),
            road: RoadConfig {
                waypoints: vec![
                    waypoint(-122.400, Some(11), false),
                    waypoint(-122.395, None, true),
                    waypoint(-122.390, None, false),
                ],
            },
            estimator: Default::default(),
            probes: Default::default(),
            synthetic: Default::default(),
            data: DataConfig {
                dir: Some(dir.to_path_buf()),
                pems_dir: Some("pems".into()),
                cab_dir: Some("cabs".into()),
                upstream_vds: Some(10),
                channel_vds: vec![11],
                ..Default::default()
            },
        };
        scenario.simulation.start_time = 1_211_299_200.0;
        scenario.simulation.end_time = 1_211_299_200.0 + 600.0;
        scenario.estimator.default_speeds = vec![25.0, 25.0];
        scenario.estimator.default_speed_variances = vec![16.0, 16.0];
        scenario
    }

    const STATION: &str = "5 Minutes,Flow (Veh/5 Minutes),Speed (mph)\n05/20/2008 09:00,150,60\n05/20/2008 09:05,120,50\n";

    #[test]
    fn builds_detector_bank_and_initial_densities() {
        let dir = std::env::temp_dir().join(format!("corridor-recorded-{}", std::process::id()));
        fs::create_dir_all(dir.join("pems")).unwrap();
        fs::write(dir.join("pems/pems_vds_10.csv"), STATION).unwrap();
        fs::write(dir.join("pems/pems_vds_11.csv"), STATION).unwrap();

        let scenario = scenario(&dir);
        let topology = scenario.road.build_topology().unwrap();
        let data = load_recorded(&scenario, &topology).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        // No cab directory: probes are absent, detectors still load.
        assert!(data.fixes.is_empty());
        let t0 = scenario.simulation.start_time;
        let expected = 0.5 / (60.0 * pems::MPH_TO_MPS);
        assert_eq!(data.detectors.upstream_flow(t0), Some(0.5));
        assert_eq!(data.detectors.measurement(t0).unwrap().as_slice(), &[expected]);
        let initial = data.detectors.initial_densities(t0).unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].segment, 0);
        assert!((initial[0].density - expected).abs() < 1e-12);
    }

    #[test]
    fn channel_count_must_match_the_measurement_layout() {
        let dir = std::env::temp_dir().join(format!("corridor-layout-{}", std::process::id()));
        let mut scenario = scenario(&dir);
        scenario.data.channel_vds = vec![11, 12];
        let topology = scenario.road.build_topology().unwrap();
        let err = load_recorded(&scenario, &topology).unwrap_err();
        assert!(matches!(err, ScenarioError::Data(DataError::Layout(_))));
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let dir = std::env::temp_dir();
        let mut scenario = scenario(&dir);
        scenario.data.timezone = "Mars/Olympus".into();
        let topology = scenario.road.build_topology().unwrap();
        let err = load_recorded(&scenario, &topology).unwrap_err();
        assert!(matches!(err, ScenarioError::Data(DataError::TimeZone(_))));
    }
}
