// corridor_sim/src/simulation/config/mod.rs

//! This module handles loading and validating scenario configuration from disk.

pub mod structs;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;
use tracing::info;

// Re-export public types
pub use structs::{
    DataConfig, RoadConfig, ScenarioConfig, ScenarioError, Simulation, SyntheticConfig, WaypointConfig,
};

/// Loads a scenario TOML file. `CORRIDOR_`-prefixed environment variables
/// override file values, with `__` separating nested keys
/// (e.g. `CORRIDOR_SIMULATION__SEED=7`).
///
/// `data_dir` replaces `data.dir`; when neither is set, recorded data paths
/// are taken relative to the scenario file.
pub fn load_scenario(path: &Path, data_dir: Option<&Path>) -> Result<ScenarioConfig> {
    if !path.is_file() {
        bail!("scenario file not found at {}", path.display());
    }
    info!("Loading scenario from: {}", path.display());

    let mut scenario: ScenarioConfig = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("CORRIDOR_").split("__"))
        .extract()
        .with_context(|| format!("failed to parse scenario file at {}", path.display()))?;

    if let Some(dir) = data_dir {
        scenario.data.dir = Some(dir.to_path_buf());
    } else if scenario.data.dir.is_none() {
        scenario.data.dir = path.parent().map(Path::to_path_buf);
    }
    scenario
        .resolve_road()
        .with_context(|| format!("failed to read the road of {}", path.display()))?;
    scenario
        .validate()
        .with_context(|| format!("invalid scenario in {}", path.display()))?;
    Ok(scenario)
}

impl ScenarioConfig {
    /// Parses a scenario from TOML text, without environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut scenario: ScenarioConfig = toml::from_str(text).context("failed to parse scenario TOML")?;
        scenario.resolve_road()?;
        scenario.validate()?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use corridor_core::road::RampKind;

    const PLANAR: &str = r#"
        [simulation]
        seed = 3
        start_time = 0.0
        end_time = 300.0
        timestep = 5.0

        [[road.waypoints]]
        x = 0.0
        y = 0.0

        [[road.waypoints]]
        x = 500.0
        y = 0.0
        on_ramp = true

        [[road.waypoints]]
        x = 1000.0
        y = 0.0

        [estimator]
        default_speeds = [25.0, 24.0]
        default_speed_variances = [16.0, 16.0]
    "#;

    #[test]
    fn parses_planar_scenario() {
        let scenario = ScenarioConfig::from_toml_str(PLANAR).unwrap();
        assert_eq!(scenario.simulation.seed, Some(3));
        let topo = scenario.road.build_topology().unwrap();
        assert_eq!(topo.n_segments(), 2);
        assert_eq!(topo.segment(0).unwrap().ramp_kind, RampKind::On);
        // Unspecified estimator fields keep their defaults.
        assert_eq!(scenario.estimator.max_age_use_prev_speed, 10);
    }

    #[test]
    fn projects_geographic_waypoints() {
        let road = RoadConfig {
            waypoints: vec![
                WaypointConfig {
                    lat: Some(37.700),
                    long: Some(-122.400),
                    ..Default::default()
                },
                WaypointConfig {
                    lat: Some(37.701),
                    long: Some(-122.400),
                    ..Default::default()
                },
            ],
        };
        let topo = road.build_topology().unwrap();
        assert_abs_diff_eq!(topo.segment(0).unwrap().length, 111.32, epsilon = 0.01);
        assert_abs_diff_eq!(topo.segment(0).unwrap().angle, std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn rejects_mixed_coordinates() {
        let road = RoadConfig {
            waypoints: vec![
                WaypointConfig {
                    x: Some(0.0),
                    y: Some(0.0),
                    ..Default::default()
                },
                WaypointConfig {
                    lat: Some(37.7),
                    long: Some(-122.4),
                    ..Default::default()
                },
            ],
        };
        assert!(matches!(road.build_topology(), Err(ScenarioError::MixedCoordinates)));

        let road = RoadConfig {
            waypoints: vec![WaypointConfig {
                x: Some(0.0),
                ..Default::default()
            }],
        };
        assert!(matches!(
            road.build_topology(),
            Err(ScenarioError::MissingCoordinates { index: 0 })
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let text = PLANAR.replace("timestep = 5.0", "timestep = 5.0\nspeedup = 2.0");
        assert!(ScenarioConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn calibration_must_match_the_road() {
        let text = PLANAR.replace("[25.0, 24.0]", "[25.0]");
        let err = ScenarioConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("default_speeds") || format!("{err:#}").contains("default_speeds"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_scenario(Path::new("does/not/exist.toml"), None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn timestep_must_suit_the_shortest_segment() {
        // 500 m segments are crossed in 12.5 s at the 40 m/s plausibility limit.
        let text = PLANAR.replace("timestep = 5.0", "timestep = 20.0");
        let err = ScenarioConfig::from_toml_str(&text).unwrap_err();
        assert!(format!("{err:#}").contains("too long for segment"));
    }

    #[test]
    fn road_and_data_paths_resolve_against_the_scenario_directory() {
        let dir = std::env::temp_dir().join(format!("corridor-scenario-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("road.csv"),
            "lat,long,on_ramp,off_ramp,vds_id\n37.700,-122.400,0,0,11\n37.700,-122.395,1,0,\n37.700,-122.390,0,0,\n",
        )
        .unwrap();
        let scenario_path = dir.join("recorded.toml");
        std::fs::write(
            &scenario_path,
            r#"
            [simulation]
            start_time = 0.0
            end_time = 300.0
            timestep = 5.0

            [estimator]
            default_speeds = [25.0, 25.0]
            default_speed_variances = [16.0, 16.0]

            [data]
            road_csv = "road.csv"
            pems_dir = "pems"
            "#,
        )
        .unwrap();

        let scenario = load_scenario(&scenario_path, None).unwrap();
        assert_eq!(scenario.road.waypoints.len(), 3);
        assert_eq!(scenario.road.waypoints[0].vds_id, Some(11));
        assert!(scenario.road.waypoints[1].on_ramp);
        assert!(scenario.data.is_recorded());
        assert_eq!(scenario.data.pems_path(), Some(dir.join("pems")));

        let elsewhere = Path::new("/srv/corridor");
        let err = load_scenario(&scenario_path, Some(elsewhere)).unwrap_err();
        // The road CSV is looked up in the overriding directory too.
        assert!(format!("{err:#}").contains("road.csv"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn road_given_twice_is_rejected() {
        let text = format!("{PLANAR}\n[data]\nroad_csv = \"road.csv\"\n");
        let err = ScenarioConfig::from_toml_str(&text).unwrap_err();
        assert!(format!("{err:#}").contains("both inline"));
    }
}
