//! Common types and utilities shared across CLI commands.

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use irradscan::config::ConfigFile;
use irradscan::fluence::{
    DirectionPolicy, FluenceMap, KernelParams, LookupStrategy, ReconstructionConfig,
};
use irradscan::stage::{SimulatedAxis, StageConfig, XyStage};
use irradscan::telemetry::TelemetryPublisher;
use irradscan::units::DistanceUnit;

use crate::error::CliError;

/// Row direction selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum DirectionArg {
    /// Take the direction from each row's recorded start and stop
    Recorded,
    /// Even rows forward, odd rows reversed
    RowParity,
}

impl From<DirectionArg> for DirectionPolicy {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Recorded => DirectionPolicy::Recorded,
            DirectionArg::RowParity => DirectionPolicy::RowParity,
        }
    }
}

/// Beam sample lookup selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LookupArg {
    /// Walk the samples forward with a cursor
    Cursor,
    /// Binary search for every row
    BinarySearch,
}

impl From<LookupArg> for LookupStrategy {
    fn from(arg: LookupArg) -> Self {
        match arg {
            LookupArg::Cursor => LookupStrategy::Cursor,
            LookupArg::BinarySearch => LookupStrategy::BinarySearch,
        }
    }
}

/// Distance unit selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum UnitArg {
    /// Millimetres
    Mm,
    /// Centimetres
    Cm,
}

impl From<UnitArg> for DistanceUnit {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::Mm => DistanceUnit::Mm,
            UnitArg::Cm => DistanceUnit::Cm,
        }
    }
}

/// Reconstruction overrides shared by `simulate` and `reconstruct`.
///
/// Anything left unset falls back to the `[fluence]` config section.
#[derive(Debug, Clone, Args)]
pub struct ReconstructionArgs {
    /// Number of bins along x
    #[arg(long)]
    pub bins_x: Option<usize>,

    /// Number of bins along y
    #[arg(long)]
    pub bins_y: Option<usize>,

    /// Beam sigma along x in mm
    #[arg(long)]
    pub sigma_x: Option<f64>,

    /// Beam sigma along y in mm
    #[arg(long)]
    pub sigma_y: Option<f64>,

    /// Kernel cutoff in sigmas
    #[arg(long)]
    pub skip_sigmas: Option<f64>,

    /// Neutron-equivalence hardness factor for the summary
    #[arg(long)]
    pub hardness: Option<f64>,

    /// How row direction is decided
    #[arg(long, value_enum, default_value_t = DirectionArg::Recorded)]
    pub direction: DirectionArg,

    /// How beam samples are looked up per row
    #[arg(long, value_enum, default_value_t = LookupArg::Cursor)]
    pub lookup: LookupArg,

    /// Reconstruct rows on all cores
    #[arg(long)]
    pub parallel: bool,
}

/// Resolve reconstruction settings from CLI args and config.
pub fn resolve_reconstruction(
    args: &ReconstructionArgs,
    config: &ConfigFile,
) -> Result<ReconstructionConfig, CliError> {
    // CLI takes precedence, then config
    let fluence = &config.fluence;
    let kernel = KernelParams::new(
        args.sigma_x.unwrap_or(fluence.sigma_x),
        args.sigma_y.unwrap_or(fluence.sigma_y),
        args.skip_sigmas.unwrap_or(fluence.skip_sigmas),
    )?;

    let bins_x = args.bins_x.unwrap_or(fluence.bins_x);
    let bins_y = args.bins_y.unwrap_or(fluence.bins_y);
    if bins_x == 0 || bins_y == 0 {
        return Err(CliError::Config(format!(
            "Bin counts must be positive, got {} x {}",
            bins_x, bins_y
        )));
    }

    Ok(ReconstructionConfig::default()
        .with_bins(bins_x, bins_y)
        .with_kernel(kernel)
        .with_scan_accel(fluence.scan_accel)
        .with_hardness_factor(args.hardness.unwrap_or(fluence.hardness_factor))
        .with_direction(args.direction.into())
        .with_lookup(args.lookup.into()))
}

/// Telemetry publisher sized and named from the `[telemetry]` section.
pub fn telemetry_publisher(config: &ConfigFile) -> TelemetryPublisher {
    TelemetryPublisher::new(config.telemetry.capacity, config.telemetry.sender.clone())
}

/// A stage on simulated axes carrying the persisted stage state.
///
/// Speed and maintenance interval come from the `[stage]` section.
pub fn simulated_stage(config: &ConfigFile, time_scale: f64) -> Result<XyStage, CliError> {
    if !(time_scale.is_finite() && time_scale >= 0.0) {
        return Err(CliError::Config(format!(
            "Time scale must be a non-negative number, got {}",
            time_scale
        )));
    }

    let mut state = StageConfig::load_or_default(&config.stage_state_path())?;
    state.default_speed = config.stage.default_speed;
    state.maintenance_interval_mm = config.stage.maintenance_interval_mm;

    let stage = XyStage::new(
        Box::new(SimulatedAxis::new("x").with_time_scale(time_scale)),
        Box::new(SimulatedAxis::new("y").with_time_scale(time_scale)),
    );
    Ok(stage.with_config(state))
}

/// Progress bar counting rows; a spinner when the total is unknown.
pub fn row_progress_bar(total_rows: Option<u64>) -> ProgressBar {
    match total_rows {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
            bar
        }
        None => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} rows {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner
        }
    }
}

/// Print the statistics of a reconstructed map.
pub fn print_map_summary(map: &FluenceMap) {
    let (bins_x, bins_y) = map.bins();

    println!("{}", style("Fluence Map").bold());
    println!("-----------");
    println!("  Bins:        {} x {}", bins_x, bins_y);
    println!("  Deposited:   {:.4e} particles", map.deposited_particles);
    println!("  In map:      {:.4e} particles", map.total_particles());
    println!("  Peak:        {:.4e} particles/cm²", map.max());
    println!(
        "  Mean:        {:.4e} ± {:.4e} particles/cm²",
        map.mean(),
        map.std_dev()
    );
    if (map.hardness_factor - 1.0).abs() > f64::EPSILON {
        println!(
            "  Peak (neq):  {:.4e} n_eq/cm² (hardness factor {})",
            map.max() * map.hardness_factor,
            map.hardness_factor
        );
    }
}
