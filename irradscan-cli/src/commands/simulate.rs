//! Simulate command - raster scan on simulated axes with a simulated beam.
//!
//! Runs the real scan controller, sampler and reconstructor against
//! [`SimulatedAxis`](irradscan::stage::SimulatedAxis) axes and a constant
//! beam with optional outages. Rows are reconstructed as they arrive; the
//! final map is rebuilt from the complete record once sampling has stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Args;
use console::style;
use irradscan::fluence::{reconstruct_parallel, reconstruct_with, FluenceReconstructor};
use irradscan::sampler::{
    BeamQualityMonitor, ConstantCurrent, SamplerHandle, DEFAULT_SAMPLE_RATE_HZ,
};
use irradscan::scan::{ScanController, ScanError, ScanOutcome, ScanRecord};
use irradscan::stage::Position;
use irradscan::telemetry::TelemetrySubscriber;
use tracing::{info, warn};

use super::common::{
    print_map_summary, resolve_reconstruction, row_progress_bar, simulated_stage,
    telemetry_publisher, ReconstructionArgs,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Amperes per nanoampere.
const NANOAMPERE: f64 = 1e-9;

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Scan width in mm
    #[arg(long, default_value_t = 10.0)]
    pub width: f64,

    /// Scan height in mm
    #[arg(long, default_value_t = 10.0)]
    pub height: f64,

    /// Scan speed in mm/s (default: scan.scan_speed)
    #[arg(long)]
    pub speed: Option<f64>,

    /// Row separation in mm (default: scan.step_size)
    #[arg(long)]
    pub step: Option<f64>,

    /// Full sweeps before finishing; 0 scans until Ctrl+C
    #[arg(long, default_value_t = 1)]
    pub sweeps: u32,

    /// Beam current in nA
    #[arg(long, default_value_t = 1.0)]
    pub current: f64,

    /// Beam outage as START:DURATION in seconds after sampling begins
    #[arg(long, value_parser = parse_outage)]
    pub outage: Vec<(f64, f64)>,

    /// Pause the scan while the beam current is below this many nA
    #[arg(long)]
    pub min_current: Option<f64>,

    /// Beam sampling rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE_HZ)]
    pub sample_rate: f64,

    /// Fraction of the physical move time the simulated axes take
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Write the scan record (rows and beam samples) as JSON
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Write the reconstructed fluence map as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print telemetry messages to stdout as JSON lines
    #[arg(long)]
    pub telemetry: bool,

    #[command(flatten)]
    pub reconstruction: ReconstructionArgs,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("simulate");
    let config = runner.config();

    let speed = args.speed.unwrap_or(config.scan.scan_speed);
    let step = args.step.unwrap_or(config.scan.step_size);
    let reconstruction = resolve_reconstruction(&args.reconstruction, config)?;
    let state_path = config.stage_state_path();

    let publisher = telemetry_publisher(config);
    let stage = simulated_stage(config, args.time_scale)?.with_publisher(publisher.clone());
    let controller = Arc::new(
        ScanController::new(stage)
            .with_publisher(publisher.clone())
            .with_pause_poll(Duration::from_millis(config.scan.pause_poll_ms)),
    );
    let area = controller.prepare(
        Position::default(),
        Position::new(args.width, args.height),
        speed,
        step,
    )?;
    let n_rows = area.n_rows();

    // Print banner
    println!("IrradScan Simulated Scan v{}", irradscan::VERSION);
    println!("============================");
    println!();
    println!(
        "Area:     {} mm x {} mm ({} rows, {} mm step)",
        args.width, args.height, n_rows, step
    );
    println!("Speed:    {} mm/s", speed);
    println!("Beam:     {} nA at {} Hz", args.current, args.sample_rate);
    if let Some(min) = args.min_current {
        println!("Pausing:  below {} nA", min);
    }
    if args.sweeps == 0 {
        println!("Sweeps:   until stopped");
    } else {
        println!("Sweeps:   {}", args.sweeps);
    }
    println!();
    println!("Press Ctrl+C to stop after the current row");
    println!();

    if args.telemetry {
        spawn_telemetry_printer(publisher.subscribe())?;
    }

    let mut source = ConstantCurrent::new(args.current * NANOAMPERE);
    for &(from, duration) in &args.outage {
        source = source.with_outage(from, duration);
    }
    let monitor = args
        .min_current
        .map(|min| BeamQualityMonitor::new(min * NANOAMPERE, controller.signals()));
    let sampler = SamplerHandle::spawn(Box::new(source), args.sample_rate, monitor)?;
    let beam = sampler.stream();

    // Set up signal handler for a row-boundary stop
    let handler_controller = Arc::clone(&controller);
    ctrlc::set_handler(move || {
        println!();
        println!("Received stop signal, returning to origin after the current row...");
        handler_controller.stop();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let mut live = Some(
        FluenceReconstructor::new(&area, reconstruction.clone())?
            .with_publisher(publisher.clone()),
    );
    let mut rows = controller.subscribe_rows();
    let total_rows = (args.sweeps > 0).then(|| u64::from(args.sweeps) * n_rows as u64);
    let progress = if args.telemetry {
        indicatif::ProgressBar::hidden()
    } else {
        row_progress_bar(total_rows)
    };

    controller.start()?;
    if args.sweeps == 1 {
        controller.finish();
    }
    // The last sweep is running once its first row arrives
    let finish_at = (args.sweeps > 1).then(|| (args.sweeps as usize - 1) * n_rows + 1);

    let mut received = 0;
    while let Some(row) = rows.blocking_recv() {
        received += 1;
        if Some(received) == finish_at {
            controller.finish();
        }

        if let Some(reconstructor) = live.as_mut() {
            let result = reconstructor.process_row(&row, &beam.read());
            match result {
                Ok(deposit) => progress.set_message(format!(
                    "row {} ({:.3e} particles)",
                    row.row_index,
                    deposit.particles()
                )),
                Err(e) => {
                    warn!(row = row.row_index, error = %e, "Live reconstruction disabled");
                    live = None;
                }
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let report = controller
        .join()?
        .ok_or_else(|| ScanError::Worker("scan worker did not report".to_string()))?;

    // Let the sampler cover the end of the last row
    thread::sleep(Duration::from_secs_f64(2.0 / args.sample_rate));
    let stats = sampler.stop();
    let record = ScanRecord::new(area, report.rows.clone(), beam.read().clone());

    if let Err(e) = controller.with_stage(|s| s.save_config(&state_path)) {
        warn!(path = %state_path.display(), error = %e, "Failed to save stage state");
    }

    println!("{}", style("Scan").bold());
    println!("----");
    match &report.outcome {
        ScanOutcome::Finished => println!("  Outcome:     {}", style("finished").green()),
        ScanOutcome::Stopped => println!("  Outcome:     {}", style("stopped").yellow()),
        ScanOutcome::Failed(e) => println!("  Outcome:     {} ({})", style("failed").red(), e),
    }
    println!("  Sweeps:      {}", report.sweeps_completed);
    println!("  Rows:        {}", report.rows.len());
    println!(
        "  Samples:     {} ({} read errors, {} skipped)",
        stats.samples, stats.read_errors, stats.skipped
    );
    if let Some(e) = &report.cleanup_error {
        println!("  Cleanup:     {} ({})", style("failed").red(), e);
    }
    println!();

    if let Some(path) = &args.record {
        record.save(path)?;
        println!("Scan record written to {}", path.display());
    }

    if !record.rows.is_empty() {
        let map = if args.reconstruction.parallel {
            reconstruct_parallel(&record.rows, &record.beam, &record.area, &reconstruction)?
        } else {
            reconstruct_with(&record.rows, &record.beam, &record.area, &reconstruction)?
        };
        info!(
            rows = record.rows.len(),
            deposited = map.deposited_particles,
            "Reconstructed fluence map"
        );
        print_map_summary(&map);

        if let Some(path) = &args.output {
            map.save(path)?;
            println!();
            println!("Fluence map written to {}", path.display());
        }
    }

    match (report.outcome, report.cleanup_error) {
        (_, Some(e)) | (ScanOutcome::Failed(e), None) => Err(CliError::Scan(e)),
        _ => Ok(()),
    }
}

/// Print every telemetry message as a JSON line from a background thread.
fn spawn_telemetry_printer(mut subscriber: TelemetrySubscriber) -> Result<(), CliError> {
    thread::Builder::new()
        .name("telemetry-printer".to_string())
        .spawn(move || {
            while let Some(message) = subscriber.next_blocking() {
                match message.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to encode telemetry message"),
                }
            }
        })?;
    Ok(())
}

/// Parse `START:DURATION` in seconds.
fn parse_outage(s: &str) -> Result<(f64, f64), String> {
    let (start, duration) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:DURATION, got '{}'", s))?;
    let start: f64 = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid outage start '{}': {}", start, e))?;
    let duration: f64 = duration
        .trim()
        .parse()
        .map_err(|e| format!("invalid outage duration '{}': {}", duration, e))?;
    if start < 0.0 || duration <= 0.0 {
        return Err(format!(
            "outage needs start >= 0 and duration > 0, got '{}'",
            s
        ));
    }
    Ok((start, duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outage() {
        assert_eq!(parse_outage("2:0.5"), Ok((2.0, 0.5)));
        assert_eq!(parse_outage(" 0 : 1 "), Ok((0.0, 1.0)));
    }

    #[test]
    fn test_parse_outage_rejects_bad_input() {
        assert!(parse_outage("2").is_err());
        assert!(parse_outage("a:1").is_err());
        assert!(parse_outage("1:0").is_err());
        assert!(parse_outage("-1:1").is_err());
    }
}
