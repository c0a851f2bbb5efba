// corridor_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Corridor: freeway density estimation from probe speeds and detectors.
///
/// This struct defines the command-line arguments of the `corridor_sim` binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/two_ramp_corridor.toml")]
    pub scenario: PathBuf,

    /// Seed for the synthetic data; overrides the scenario's seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop time in seconds; overrides the scenario's end_time.
    #[arg(long)]
    pub end_time: Option<f64>,

    /// Directory of recorded data; overrides the scenario's data.dir.
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from(["corridor_sim", "--scenario", "a.toml", "--seed", "9", "--end-time", "120"]);
        assert_eq!(cli.scenario, PathBuf::from("a.toml"));
        assert_eq!(cli.seed, Some(9));
        assert_eq!(cli.end_time, Some(120.0));
        assert!(cli.data_dir.is_none());

        let cli = Cli::parse_from(["corridor_sim", "-d", "/data/i80"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/data/i80")));

        let defaults = Cli::parse_from(["corridor_sim"]);
        assert!(defaults.seed.is_none());
        assert!(defaults.end_time.is_none());
    }
}
