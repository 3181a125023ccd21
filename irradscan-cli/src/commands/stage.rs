//! Stage state CLI commands.
//!
//! Stored positions and travel counters live in the stage state file
//! (`stage.state_file`, or `stage.json` next to the config file).

use clap::Subcommand;
use irradscan::config::ConfigFile;
use irradscan::stage::StageConfig;
use irradscan::units::DistanceUnit;

use super::common::{simulated_stage, UnitArg};
use crate::error::CliError;

/// Stage subcommands.
#[derive(Debug, Subcommand)]
pub enum StageCommands {
    /// List stored positions
    Positions,

    /// Store a named position
    Add {
        /// Position name
        name: String,

        /// X coordinate
        x: f64,

        /// Y coordinate
        y: f64,

        /// Unit of the coordinates
        #[arg(long, value_enum, default_value_t = UnitArg::Mm)]
        unit: UnitArg,
    },

    /// Remove a stored position
    Remove {
        /// Position name
        name: String,
    },

    /// Show accumulated axis travel
    Travel,
}

/// Run a stage subcommand.
pub fn run(command: StageCommands) -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    match command {
        StageCommands::Positions => run_positions(&config),
        StageCommands::Add { name, x, y, unit } => run_add(&config, &name, x, y, unit),
        StageCommands::Remove { name } => run_remove(&config, &name),
        StageCommands::Travel => run_travel(&config),
    }
}

fn load_state(config: &ConfigFile) -> Result<StageConfig, CliError> {
    Ok(StageConfig::load_or_default(&config.stage_state_path())?)
}

/// List stored positions.
fn run_positions(config: &ConfigFile) -> Result<(), CliError> {
    let state = load_state(config)?;
    if state.positions.is_empty() {
        println!("No stored positions");
        return Ok(());
    }

    println!("{:<20} {:>10} {:>10}  {:<4} Updated", "Name", "X", "Y", "Unit");
    for (name, position) in &state.positions {
        println!(
            "{:<20} {:>10.3} {:>10.3}  {:<4} {}",
            name,
            position.x,
            position.y,
            position.unit.as_str(),
            position.date
        );
    }
    Ok(())
}

/// Store a named position.
fn run_add(
    config: &ConfigFile,
    name: &str,
    x: f64,
    y: f64,
    unit: UnitArg,
) -> Result<(), CliError> {
    if name.trim().is_empty() {
        return Err(CliError::Config("Position name must not be empty".to_string()));
    }

    let unit = DistanceUnit::from(unit);
    let mut stage = simulated_stage(config, 0.0)?;
    stage.add_position(name, x, y, unit);
    stage.save_config(&config.stage_state_path())?;

    println!("Stored {} = ({}, {}) {}", name, x, y, unit);
    Ok(())
}

/// Remove a stored position.
fn run_remove(config: &ConfigFile, name: &str) -> Result<(), CliError> {
    let mut stage = simulated_stage(config, 0.0)?;
    if !stage.remove_position(name) {
        return Err(CliError::Config(format!(
            "No stored position named '{}'",
            name
        )));
    }
    stage.save_config(&config.stage_state_path())?;

    println!("Removed {}", name);
    Ok(())
}

/// Show accumulated axis travel.
fn run_travel(config: &ConfigFile) -> Result<(), CliError> {
    let state = load_state(config)?;

    println!("Stage Travel");
    println!("============");
    println!();
    println!(
        "  Since maintenance:  x {:.1} mm, y {:.1} mm",
        state.interval_travel.x, state.interval_travel.y
    );
    println!(
        "  Lifetime:           x {:.1} mm, y {:.1} mm",
        state.total_travel.x, state.total_travel.y
    );
    println!("  Maintenance every:  {:.1} mm", state.maintenance_interval_mm);
    if let Some(updated) = &state.last_update {
        println!("  Last update:        {}", updated);
    }
    Ok(())
}
