// corridor_sim/src/main.rs

//! Runs one corridor scenario end to end, on recorded data when the scenario
//! names some and on a synthetic corridor otherwise.
//!
//! `cargo run -p corridor_sim -- --scenario assets/scenarios/two_ramp_corridor.toml`

use anyhow::Result;
use clap::Parser;
use corridor_sim::cli::Cli;
use corridor_sim::simulation::config::load_scenario;
use corridor_sim::simulation::core::runner::run_scenario;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // --- 1. Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corridor_sim=info,corridor_core=info")),
        )
        .init();

    // --- 2. Load Scenario ---
    let cli = Cli::parse();
    let mut scenario = load_scenario(&cli.scenario, cli.data_dir.as_deref())?;
    if let Some(end_time) = cli.end_time {
        scenario.simulation.end_time = end_time;
    }

    // --- 3. Run ---
    info!("Starting corridor estimation...");
    let summary = run_scenario(&scenario, cli.seed)?;

    info!(
        iterations = summary.iterations,
        skipped_updates = summary.skipped_updates,
        rms_density_error = ?summary.rms_density_error,
        vehicles = summary.final_vehicles,
        "Run complete."
    );
    for (segment, density) in summary.final_state.mainline_densities().iter().enumerate() {
        info!(segment, density, "Final density.");
    }
    Ok(())
}
