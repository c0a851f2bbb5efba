// corridor_sim/src/simulation/config/structs.rs

use corridor_core::config::EstimatorConfig;
use corridor_core::error::EstimatorError;
use corridor_core::models::conservation::ConservationDynamics;
use corridor_core::road::geometry::{self, GeoPoint};
use corridor_core::road::{RoadTopology, Waypoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::simulation::recorded::{self, DataError};
use crate::simulation::sources::probes::ProbeAssignment;

/// Semantic problems with a scenario that parsed fine.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("waypoint {index} needs either x/y or lat/long coordinates")]
    MissingCoordinates { index: usize },
    #[error("waypoints mix planar (x/y) and geographic (lat/long) coordinates")]
    MixedCoordinates,
    #[error("invalid simulation timing: {0}")]
    InvalidTiming(String),
    #[error("invalid synthetic data settings: {0}")]
    Synthetic(String),
    #[error("road waypoints are given both inline and in {0}")]
    DuplicateRoad(String),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Data(#[from] DataError),
}

// =========================================================================
// == Top-Level Scenario ==
// =========================================================================

/// The root of the data parsed from a `scenario.toml` file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)] // Use default if the [simulation] section is missing
    pub simulation: Simulation,

    /// May be left empty when `data.road_csv` names the road instead.
    #[serde(default)]
    pub road: RoadConfig,

    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub probes: ProbeAssignment,

    #[serde(default)]
    pub synthetic: SyntheticConfig,

    #[serde(default)]
    pub data: DataConfig,
}

impl ScenarioConfig {
    /// Fills `road.waypoints` from `data.road_csv` when one is configured.
    pub fn resolve_road(&mut self) -> Result<(), ScenarioError> {
        let Some(path) = self.data.road_csv_path() else {
            return Ok(());
        };
        if !self.road.waypoints.is_empty() {
            return Err(ScenarioError::DuplicateRoad(path.display().to_string()));
        }
        self.road.waypoints = recorded::read_road_csv(&path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let sim = &self.simulation;
        if !(sim.timestep > 0.0) {
            return Err(ScenarioError::InvalidTiming(format!(
                "timestep must be positive, got {}",
                sim.timestep
            )));
        }
        if !(sim.end_time > sim.start_time) {
            return Err(ScenarioError::InvalidTiming(format!(
                "end_time {} is not after start_time {}",
                sim.end_time, sim.start_time
            )));
        }
        let topology = self.road.build_topology()?;
        self.estimator.validate(&topology)?;
        ConservationDynamics::new(&topology, &self.estimator, sim.timestep)?;
        Ok(())
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Time the initial state describes, in seconds.
    pub start_time: f64,
    /// The estimator loop stops once its next window would end after this.
    pub end_time: f64,
    /// Estimator step, in seconds.
    pub timestep: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: None,
            start_time: 0.0,
            end_time: 3600.0,
            timestep: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoadConfig {
    /// Ordered upstream to downstream.
    pub waypoints: Vec<WaypointConfig>,
}

/// A waypoint given either in planar meters (`x`, `y`) or in degrees (`lat`, `long`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaypointConfig {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    #[serde(default)]
    pub on_ramp: bool,
    #[serde(default)]
    pub off_ramp: bool,
    /// Detector station at this waypoint, used for the initial densities.
    #[serde(default)]
    pub vds_id: Option<u64>,
}

impl RoadConfig {
    /// Centroid of the waypoints when all of them are geographic. Geographic
    /// roads are projected about this point.
    pub fn geo_center(&self) -> Option<GeoPoint> {
        let geo: Option<Vec<GeoPoint>> = self
            .waypoints
            .iter()
            .map(|w| Some(GeoPoint { lat: w.lat?, long: w.long? }))
            .collect();
        geometry::centroid(&geo?)
    }

    /// Resolves every waypoint to planar coordinates and builds the topology.
    /// Geographic waypoints are projected about their centroid.
    pub fn build_topology(&self) -> Result<RoadTopology, ScenarioError> {
        let planar = self.waypoints.iter().all(|w| w.x.is_some() && w.y.is_some());
        let geographic = self.waypoints.iter().all(|w| w.lat.is_some() && w.long.is_some());

        let positions: Vec<(f64, f64)> = if planar {
            self.waypoints
                .iter()
                .map(|w| (w.x.unwrap_or_default(), w.y.unwrap_or_default()))
                .collect()
        } else if geographic {
            let geo: Vec<GeoPoint> = self
                .waypoints
                .iter()
                .map(|w| GeoPoint {
                    lat: w.lat.unwrap_or_default(),
                    long: w.long.unwrap_or_default(),
                })
                .collect();
            let center = geometry::centroid(&geo).ok_or(ScenarioError::MissingCoordinates { index: 0 })?;
            geo.iter()
                .map(|p| {
                    let xy = geometry::project(*p, center);
                    (xy.x, xy.y)
                })
                .collect()
        } else {
            let first_incomplete = self.waypoints.iter().position(|w| {
                !(w.x.is_some() && w.y.is_some()) && !(w.lat.is_some() && w.long.is_some())
            });
            return Err(match first_incomplete {
                Some(index) => ScenarioError::MissingCoordinates { index },
                None => ScenarioError::MixedCoordinates,
            });
        };

        let waypoints: Vec<Waypoint> = positions
            .into_iter()
            .zip(&self.waypoints)
            .map(|((x, y), cfg)| Waypoint {
                on_ramp: cfg.on_ramp,
                off_ramp: cfg.off_ramp,
                ..Waypoint::new(x, y)
            })
            .collect();
        Ok(RoadTopology::from_waypoints(&waypoints)?)
    }
}

/// Where recorded data lives. Relative paths are taken from `dir`, which
/// defaults to the scenario file's directory. Without `pems_dir` or
/// `cab_dir` the run uses the synthetic corridor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DataConfig {
    pub dir: Option<PathBuf>,
    /// Road sections as `lat,long,on_ramp,off_ramp[,vds_id]` rows.
    pub road_csv: Option<PathBuf>,
    /// Directory holding `_cabs.txt` and the `new_<id>.txt` traces.
    pub cab_dir: Option<PathBuf>,
    /// Directory holding `pems_vds_<id>.csv` exports.
    pub pems_dir: Option<PathBuf>,
    /// Zone of the PeMS local timestamps.
    pub timezone: String,
    /// Station whose flow feeds segment 0.
    pub upstream_vds: Option<u64>,
    /// One station per measurement channel, in channel order.
    pub channel_vds: Vec<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: None,
            road_csv: None,
            cab_dir: None,
            pems_dir: None,
            timezone: "US/Pacific".to_string(),
            upstream_vds: None,
            channel_vds: Vec::new(),
        }
    }
}

impl DataConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn road_csv_path(&self) -> Option<PathBuf> {
        self.road_csv.as_deref().map(|p| self.resolve(p))
    }

    pub fn cab_path(&self) -> Option<PathBuf> {
        self.cab_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn pems_path(&self) -> Option<PathBuf> {
        self.pems_dir.as_deref().map(|p| self.resolve(p))
    }

    /// Whether the run draws on recorded probes or detectors.
    pub fn is_recorded(&self) -> bool {
        self.cab_dir.is_some() || self.pems_dir.is_some()
    }
}

/// Settings of the synthetic corridor used when no recorded data is supplied.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyntheticConfig {
    /// True mean speed per segment (m/s). Falls back to the estimator's default speeds.
    pub true_speeds: Option<Vec<f64>>,
    /// Relative amplitude of the slow speed oscillation.
    pub speed_variation: f64,
    /// Period of the speed oscillation, in seconds.
    pub speed_period: f64,
    /// Flow entering upstream of segment 0 (veh/s).
    pub upstream_flow: f64,
    /// True mainline density at the start (veh/m).
    pub initial_density: f64,
    /// True (constant) density of every ramp state.
    pub ramp_density: f64,
    /// Probability that a segment sees probe vehicles in a step.
    pub probe_coverage: f64,
    /// Most probe vehicles reporting on one segment in one step.
    pub max_probes_per_segment: u32,
    /// Seconds between the two fixes of one probe vehicle.
    pub fix_interval: f64,
    /// GPS position noise, meters.
    pub gps_position_std: f64,
    /// Noise on detector channel readings.
    pub detector_noise_std: f64,
    /// Noise on the upstream flow reading (veh/s).
    pub flow_noise_std: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            true_speeds: None,
            speed_variation: 0.15,
            speed_period: 900.0,
            upstream_flow: 0.5,
            initial_density: 0.02,
            ramp_density: 0.002,
            probe_coverage: 0.6,
            max_probes_per_segment: 3,
            fix_interval: 4.0,
            gps_position_std: 3.0,
            detector_noise_std: 0.001,
            flow_noise_std: 0.05,
        }
    }
}
